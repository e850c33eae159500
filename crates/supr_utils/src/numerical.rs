use ndarray as nd;
use ndarray::prelude::*;

/// Bounds for the squared rotation angle. The lower bound keeps the axis
/// normalisation finite at the rest pose, the upper bound guards against
/// overflow for degenerate inputs.
pub const MIN_SQ_ROT_ANGLE: f64 = 1e-16;
pub const MAX_SQ_ROT_ANGLE: f64 = 1e16;

fn clamped_angle<T: nd::NdFloat>(rotvec: nd::ArrayView1<T>) -> T {
    let sq_angle = rotvec.iter().fold(T::zero(), |acc, &x| acc + x * x);
    let lo = T::from(MIN_SQ_ROT_ANGLE).unwrap();
    let hi = T::from(MAX_SQ_ROT_ANGLE).unwrap();
    sq_angle.max(lo).min(hi).sqrt()
}

/// Calculates the rotation matrices for a batch of rotation vectors,
/// (`nr_joints`, 3) -> (`nr_joints`, 3, 3)
pub fn batch_rodrigues<T: nd::NdFloat>(rotvecs: nd::ArrayView2<T>) -> nd::Array3<T> {
    let mut rot_mats = nd::Array3::<T>::zeros((rotvecs.nrows(), 3, 3));

    for (idx, rotvec) in rotvecs.axis_iter(nd::Axis(0)).enumerate() {
        let angle = clamped_angle(rotvec);
        let axis = rotvec.to_owned() / angle;
        let cos = angle.cos();
        let sin = angle.sin();

        let (rx, ry, rz) = (axis[0], axis[1], axis[2]);

        let skew = array![
            [T::zero(), -rz, ry],
            [rz, T::zero(), -rx],
            [-ry, rx, T::zero()]
        ];
        let outer = axis
            .view()
            .insert_axis(nd::Axis(1))
            .dot(&axis.view().insert_axis(nd::Axis(0)));
        let rot_mat =
            nd::Array2::<T>::eye(3) * cos + outer * (T::one() - cos) + skew * sin;
        rot_mats.slice_mut(s![idx, .., ..]).assign(&rot_mat);
    }

    rot_mats
}

/// Unit-quaternion pose feature with the identity quaternion subtracted, so
/// it is exactly zero at the rest pose. Covers every joint including the
/// root, (`nr_joints`, 3) -> (4 * `nr_joints`,)
pub fn batch_quat_feature<T: nd::NdFloat>(rotvecs: nd::ArrayView2<T>) -> nd::Array1<T> {
    let mut feature = nd::Array1::<T>::zeros(4 * rotvecs.nrows());
    let half = T::from(0.5).unwrap();

    for (idx, rotvec) in rotvecs.axis_iter(nd::Axis(0)).enumerate() {
        let angle = clamped_angle(rotvec);
        let axis = rotvec.to_owned() / angle;
        let sin_half = (angle * half).sin();

        feature[4 * idx] = axis[0] * sin_half;
        feature[4 * idx + 1] = axis[1] * sin_half;
        feature[4 * idx + 2] = axis[2] * sin_half;
        feature[4 * idx + 3] = (angle * half).cos() - T::one();
    }

    feature
}

/// Rotation-matrix pose feature: the flattened difference to the identity
/// for every joint except the root, (`nr_joints`, 3) -> (9 * (`nr_joints` - 1),)
pub fn lrotmin<T: nd::NdFloat>(rotvecs: nd::ArrayView2<T>) -> nd::Array1<T> {
    let body = rotvecs.slice(s![1.., ..]);
    let mut feature = batch_rodrigues(body);
    let identity = nd::Array2::<T>::eye(3);
    for mut rot_mat in feature.axis_iter_mut(nd::Axis(0)) {
        rot_mat -= &identity;
    }
    feature.into_shape_with_order(9 * body.nrows()).unwrap()
}

/// Composes per-joint rigid transforms along the kinematic tree.
///
/// `traversal_order` must list every joint with parents strictly before
/// children, root first; `rot_mats` is (`nr_joints`, 3, 3) and `joints` the
/// rest positions (`nr_joints`, 3).
///
/// Returns the posed joint positions (the translation column of each global
/// transform) and the joint-local skinning transforms, i.e. the globals with
/// the rest-joint contribution removed from the translation column.
#[allow(clippy::similar_names)]
pub fn batch_rigid_transform<T: nd::NdFloat>(
    parent_idx_per_joint: &[usize],
    traversal_order: &[usize],
    rot_mats: &nd::Array3<T>,
    joints: &nd::Array2<T>,
) -> (nd::Array2<T>, nd::Array3<T>) {
    let nr_joints = joints.nrows();

    //contains the position relative to the parent joint
    let mut rel_joints = joints.to_owned();
    for idx_cur in 1..nr_joints {
        let parent_joint_position = joints.row(parent_idx_per_joint[idx_cur]);
        let mut row = rel_joints.row_mut(idx_cur);
        row -= &parent_joint_position;
    }

    let mut transforms_mat = nd::Array3::<T>::zeros((nr_joints, 4, 4));
    for idx in 0..nr_joints {
        transforms_mat
            .slice_mut(s![idx, 0..3, 0..3])
            .assign(&rot_mats.slice(s![idx, .., ..]));
        transforms_mat
            .slice_mut(s![idx, 0..3, 3])
            .assign(&rel_joints.row(idx));
        transforms_mat[[idx, 3, 3]] = T::one();
    }

    //accumulate along the tree; the arena is indexed by joint and written in
    // traversal order so every parent is finished before its children
    let mut transform_chain = nd::Array3::<T>::zeros((nr_joints, 4, 4));
    transform_chain
        .slice_mut(s![0, .., ..])
        .assign(&transforms_mat.slice(s![0, .., ..]));
    for &idx in &traversal_order[1..] {
        let parent_tf = transform_chain
            .slice(s![parent_idx_per_joint[idx], .., ..])
            .to_owned();
        let global_tf = parent_tf.dot(&transforms_mat.slice(s![idx, .., ..]));
        transform_chain.slice_mut(s![idx, .., ..]).assign(&global_tf);
    }

    //posed joints are just the translation part of the transform chain
    let mut posed_joints = nd::Array2::<T>::zeros((nr_joints, 3));
    for idx in 0..nr_joints {
        posed_joints
            .row_mut(idx)
            .assign(&transform_chain.slice(s![idx, 0..3, 3]));
    }

    //subtract the transformed rest-joint position from the translation column
    // so that skinning a rest vertex with an identity pose is a no-op
    let mut rel_transforms = transform_chain.clone();
    for idx in 0..nr_joints {
        let joint_homogen = array![
            joints[[idx, 0]],
            joints[[idx, 1]],
            joints[[idx, 2]],
            T::zero()
        ];
        let transformed_joint = transform_chain.slice(s![idx, .., ..]).dot(&joint_homogen);
        for row in 0..4 {
            rel_transforms[[idx, row, 3]] =
                rel_transforms[[idx, row, 3]] - transformed_joint[row];
        }
    }

    (posed_joints, rel_transforms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra as na;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn to_na(rot_mats: &nd::Array3<f64>, idx: usize) -> na::Matrix3<f64> {
        let m = rot_mats.slice(s![idx, .., ..]).to_owned();
        na::Matrix3::from_row_slice(m.as_slice().unwrap())
    }

    #[test]
    fn zero_rotation_gives_identity() {
        let rotvecs = nd::Array2::<f64>::zeros((1, 3));
        let rot_mats = batch_rodrigues(rotvecs.view());
        assert_relative_eq!(to_na(&rot_mats, 0), na::Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn quarter_turn_about_z() {
        let rotvecs = array![[0.0, 0.0, FRAC_PI_2]];
        let rot_mats = batch_rodrigues(rotvecs.view());
        let expected = na::Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(to_na(&rot_mats, 0), expected, epsilon = 1e-12);
    }

    #[test]
    fn rotation_matrices_are_orthonormal() {
        //magnitudes from the clamp floor up to well past 2*pi
        let rotvecs = array![
            [1e-9, -1e-9, 1e-9],
            [0.3, -0.2, 0.1],
            [2.0, 0.0, -1.5],
            [1e3, 2e3, -5e2],
            [1e8, 0.0, 0.0],
        ];
        let rot_mats = batch_rodrigues(rotvecs.view());
        for idx in 0..rotvecs.nrows() {
            let m = to_na(&rot_mats, idx);
            assert_relative_eq!(m.transpose() * m, na::Matrix3::identity(), epsilon = 1e-8);
            assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn overlong_rotation_vector_stays_finite() {
        //squared norm beyond the clamp ceiling; the axis is no longer unit
        // length there, so only finiteness is guaranteed
        let rotvecs: nd::Array2<f64> = array![[2e8, 2e8, 2e8]];
        let rot_mats = batch_rodrigues(rotvecs.view());
        assert!(rot_mats.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn quat_feature_vanishes_at_rest() {
        let rotvecs = nd::Array2::<f64>::zeros((4, 3));
        let feature = batch_quat_feature(rotvecs.view());
        assert_eq!(feature.len(), 16);
        for &x in &feature {
            assert_abs_diff_eq!(x, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn quat_feature_half_turn_about_z() {
        let rotvecs = array![[0.0, 0.0, PI]];
        let feature = batch_quat_feature(rotvecs.view());
        assert_abs_diff_eq!(feature[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(feature[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(feature[2], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(feature[3], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn lrotmin_skips_the_root_and_vanishes_at_rest() {
        let mut rotvecs = nd::Array2::<f64>::zeros((3, 3));
        //a root rotation must not show up in the feature
        rotvecs[[0, 2]] = FRAC_PI_2;
        let feature = lrotmin(rotvecs.view());
        assert_eq!(feature.len(), 18);
        for &x in &feature {
            assert_abs_diff_eq!(x, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn rest_pose_chain_yields_identity_skinning_transforms() {
        let joints = array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        let parents = [0, 0, 1];
        let traversal = [0, 1, 2];
        let rot_mats = batch_rodrigues(nd::Array2::<f64>::zeros((3, 3)).view());

        let (posed_joints, rel_transforms) =
            batch_rigid_transform(&parents, &traversal, &rot_mats, &joints);

        for idx in 0..3 {
            for c in 0..3 {
                assert_abs_diff_eq!(posed_joints[[idx, c]], joints[[idx, c]], epsilon = 1e-12);
            }
            let identity = nd::Array2::<f64>::eye(4);
            for row in 0..4 {
                for col in 0..4 {
                    assert_abs_diff_eq!(
                        rel_transforms[[idx, row, col]],
                        identity[[row, col]],
                        epsilon = 1e-12
                    );
                }
            }
        }
    }

    #[test]
    fn root_rotation_carries_the_child_joint() {
        let joints = array![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let parents = [0, 0];
        let traversal = [0, 1];
        let rotvecs = array![[0.0, 0.0, FRAC_PI_2], [0.0, 0.0, 0.0]];
        let rot_mats = batch_rodrigues(rotvecs.view());

        let (posed_joints, rel_transforms) =
            batch_rigid_transform(&parents, &traversal, &rot_mats, &joints);

        //the child swings from (1,0,0) onto the y axis
        assert_abs_diff_eq!(posed_joints[[1, 0]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(posed_joints[[1, 1]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(posed_joints[[1, 2]], 0.0, epsilon = 1e-12);

        //its skinning transform has no residual translation: a vertex at the
        // child's rest position lands exactly on the posed joint
        let vertex: nd::Array1<f64> = array![1.0, 0.0, 0.0, 1.0];
        let child_transform: nd::ArrayView2<f64> = rel_transforms.slice(s![1, .., ..]);
        let skinned = child_transform.dot(&vertex);
        assert_abs_diff_eq!(skinned[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(skinned[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(skinned[2], 0.0, epsilon = 1e-12);
    }
}
