use ndarray as nd;

/// Result of one batched evaluation. Plain data: the deformed geometry plus
/// the inputs echoed back, so downstream consumers can stay stateless.
#[derive(Clone, Debug)]
pub struct SuprOutput<T> {
    /// Deformed vertices, (batch, `num_verts`, 3).
    pub verts: nd::Array3<T>,
    /// Deformed joint positions, (batch, `num_joints`, 3).
    pub joints: nd::Array3<T>,
    /// The pose the call was evaluated with, (batch, 3 * `num_joints`).
    pub pose: nd::Array2<T>,
    /// The shape coefficients the call was evaluated with.
    pub betas: nd::Array2<T>,
    /// The global translation the call was evaluated with, (batch, 3).
    pub trans: nd::Array2<T>,
}
