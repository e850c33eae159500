use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek};

use log::info;
use ndarray as nd;
use ndarray::prelude::*;
use ndarray_npy::NpzReader;

use supr_utils::array::{PadOnes1, PadOnes2};
use supr_utils::numerical::{batch_quat_feature, batch_rigid_transform, batch_rodrigues, lrotmin};

use crate::common::errors::{LoadError, ShapeError};
use crate::common::outputs::SuprOutput;
use crate::common::types::{Gender, PoseFeatureKind};

/// Canonical SUPR body dimensions. Loaded containers are shape-driven; these
/// exist for callers that construct parameter buffers up front.
pub const NUM_JOINTS: usize = 75;
pub const NUM_VERTS: usize = 10475;
pub const DEFAULT_NUM_BETAS: usize = 10;

/// Container for the immutable model arrays, loaded once and shared
/// read-only across evaluation calls.
#[derive(Clone, Debug)]
pub struct SuprModel<T: nd::NdFloat> {
    pub gender: Gender,
    /// Rest-pose template, (`num_verts`, 3).
    pub verts_template: nd::Array2<T>,
    /// Triangle indices, carried through from the archive untouched.
    pub faces: nd::Array2<u32>,
    /// Shape basis, flattened to (`num_verts` * 3, `num_betas`).
    pub shape_dirs: nd::Array2<T>,
    /// Pose basis, flattened to (`num_verts` * 3, nr of pose features).
    pub pose_dirs: nd::Array2<T>,
    /// Joint regressor, (`num_joints` * 3, `num_verts` * 3 + 1); the trailing
    /// column multiplies the homogeneous 1.
    pub joint_regressor: nd::Array2<T>,
    /// Skinning weights, (`num_verts`, `num_joints`).
    pub lbs_weights: nd::Array2<T>,
    /// Parent index per joint; entry 0 belongs to the root and is ignored.
    pub parent_idx_per_joint: Vec<usize>,
    pub pose_feature_kind: PoseFeatureKind,
    //joint indices with parents strictly before children, root first;
    // computed once at load so composition never depends on table order
    traversal_order: Vec<usize>,
    num_joints: usize,
    num_verts: usize,
    num_betas: usize,
}

impl<T: nd::NdFloat> SuprModel<T> {
    /// Builds a model straight from its arrays, validating that all shapes
    /// are mutually consistent and that the kinematic table encodes an
    /// acyclic tree rooted at joint 0. The shape basis is truncated to
    /// `max_num_betas` components here, once.
    #[allow(clippy::too_many_arguments)]
    #[allow(clippy::cast_sign_loss)]
    pub fn new_from_matrices(
        gender: Gender,
        verts_template: &nd::Array2<f32>,
        faces: &nd::Array2<u32>,
        shape_dirs: &nd::Array3<f32>,
        pose_dirs: &nd::Array3<f32>,
        joint_regressor: &nd::Array2<f32>,
        kintree_table: &nd::Array2<i32>,
        lbs_weights: &nd::Array2<f32>,
        max_num_betas: usize,
    ) -> Result<Self, LoadError> {
        let num_verts = verts_template.nrows();
        if verts_template.ncols() != 3 {
            return Err(LoadError::ShapeMismatch {
                message: format!(
                    "v_template must be (num_verts, 3), got {:?}",
                    verts_template.shape()
                ),
            });
        }
        if joint_regressor.nrows() == 0 || joint_regressor.nrows() % 3 != 0 {
            return Err(LoadError::ShapeMismatch {
                message: format!(
                    "J_regressor must have 3 * num_joints rows, got {}",
                    joint_regressor.nrows()
                ),
            });
        }
        let num_joints = joint_regressor.nrows() / 3;
        if joint_regressor.ncols() != num_verts * 3 + 1 {
            return Err(LoadError::ShapeMismatch {
                message: format!(
                    "J_regressor must have 3 * num_verts + 1 = {} columns, got {}",
                    num_verts * 3 + 1,
                    joint_regressor.ncols()
                ),
            });
        }
        if shape_dirs.shape()[0] != num_verts || shape_dirs.shape()[1] != 3 {
            return Err(LoadError::ShapeMismatch {
                message: format!(
                    "shapedirs must be (num_verts, 3, nr_betas), got {:?}",
                    shape_dirs.shape()
                ),
            });
        }
        if pose_dirs.shape()[0] != num_verts || pose_dirs.shape()[1] != 3 {
            return Err(LoadError::ShapeMismatch {
                message: format!(
                    "posedirs must be (num_verts, 3, nr_features), got {:?}",
                    pose_dirs.shape()
                ),
            });
        }
        let pose_feature_kind = match pose_dirs.shape()[2] {
            n if n == 4 * num_joints => PoseFeatureKind::Quaternion,
            n if n == 9 * (num_joints - 1) => PoseFeatureKind::RotationMatrix,
            n => {
                return Err(LoadError::ShapeMismatch {
                    message: format!(
                        "posedirs has {n} feature columns, expected {} (quaternion) or {} (rotation matrix)",
                        4 * num_joints,
                        9 * (num_joints - 1)
                    ),
                })
            }
        };
        if lbs_weights.shape() != [num_verts, num_joints] {
            return Err(LoadError::ShapeMismatch {
                message: format!(
                    "weights must be ({num_verts}, {num_joints}), got {:?}",
                    lbs_weights.shape()
                ),
            });
        }
        if kintree_table.nrows() < 1 || kintree_table.ncols() != num_joints {
            return Err(LoadError::ShapeMismatch {
                message: format!(
                    "kintree_table must be (2, {num_joints}), got {:?}",
                    kintree_table.shape()
                ),
            });
        }

        //row 0 is the parent index per joint; the root's own entry is
        // conventionally garbage (-1 cast around) and forced to 0 here
        let parent_idx_per_joint: Vec<usize> = kintree_table
            .row(0)
            .iter()
            .enumerate()
            .map(|(joint, &parent)| if joint == 0 { 0 } else { parent as usize })
            .collect();
        let traversal_order = kinematic_traversal(&parent_idx_per_joint)?;

        let num_betas = max_num_betas.min(shape_dirs.shape()[2]);
        let shape_dirs = shape_dirs
            .slice_axis(Axis(2), nd::Slice::from(0..num_betas))
            .to_owned()
            .into_shape_with_order((num_verts * 3, num_betas))
            .unwrap()
            .mapv(|x| T::from(x).unwrap());
        let nr_pose_features = pose_dirs.shape()[2];
        let pose_dirs = pose_dirs
            .to_owned()
            .into_shape_with_order((num_verts * 3, nr_pose_features))
            .unwrap()
            .mapv(|x| T::from(x).unwrap());

        info!(
            "Loaded {gender} model: {num_verts} verts, {num_joints} joints, {num_betas} betas, {pose_feature_kind:?} pose features"
        );

        Ok(Self {
            gender,
            verts_template: verts_template.mapv(|x| T::from(x).unwrap()),
            faces: faces.clone(),
            shape_dirs,
            pose_dirs,
            joint_regressor: joint_regressor.mapv(|x| T::from(x).unwrap()),
            lbs_weights: lbs_weights.mapv(|x| T::from(x).unwrap()),
            parent_idx_per_joint,
            pose_feature_kind,
            traversal_order,
            num_joints,
            num_verts,
            num_betas,
        })
    }

    fn new_from_npz_reader<R: Read + Seek>(
        npz: &mut NpzReader<R>,
        gender: Gender,
        max_num_betas: usize,
    ) -> Result<Self, LoadError> {
        let verts_template: nd::Array2<f32> = read_array(npz, "v_template")?;
        let faces: nd::Array2<u32> = read_array(npz, "f")?;
        let shape_dirs: nd::Array3<f32> = read_array(npz, "shapedirs")?;
        let pose_dirs: nd::Array3<f32> = read_array(npz, "posedirs")?;
        let joint_regressor: nd::Array2<f32> = read_array(npz, "J_regressor")?;
        let kintree_table: nd::Array2<i32> = read_array(npz, "kintree_table")?;
        let lbs_weights: nd::Array2<f32> = read_array(npz, "weights")?;

        Self::new_from_matrices(
            gender,
            &verts_template,
            &faces,
            &shape_dirs,
            &pose_dirs,
            &joint_regressor,
            &kintree_table,
            &lbs_weights,
            max_num_betas,
        )
    }

    /// Loads a model from an `.npz` archive on disk.
    pub fn new_from_npz(
        model_path: &str,
        gender: Gender,
        max_num_betas: usize,
    ) -> Result<Self, LoadError> {
        let file = File::open(model_path).map_err(|source| LoadError::Open {
            path: model_path.to_string(),
            source,
        })?;
        let mut npz = NpzReader::new(file)?;
        Self::new_from_npz_reader(&mut npz, gender, max_num_betas)
    }

    /// Loads a model from any seekable reader holding `.npz` bytes.
    pub fn new_from_reader<R: Read + Seek>(
        reader: R,
        gender: Gender,
        max_num_betas: usize,
    ) -> Result<Self, LoadError> {
        let mut npz = NpzReader::new(reader)?;
        Self::new_from_npz_reader(&mut npz, gender, max_num_betas)
    }

    pub fn num_joints(&self) -> usize {
        self.num_joints
    }

    pub fn num_verts(&self) -> usize {
        self.num_verts
    }

    /// Number of shape components the truncated basis carries.
    pub fn num_betas(&self) -> usize {
        self.num_betas
    }

    pub fn faces(&self) -> &nd::Array2<u32> {
        &self.faces
    }

    /// Template plus the shape-basis offsets for one beta vector. Betas
    /// shorter than the basis drive only the leading components.
    pub fn betas2verts(&self, betas: nd::ArrayView1<T>) -> nd::Array2<T> {
        let nr_betas = betas.len().min(self.num_betas);
        let dirs = self.shape_dirs.slice(s![.., 0..nr_betas]);
        let offsets = dirs.dot(&betas.slice(s![0..nr_betas]));
        &self.verts_template
            + &offsets
                .into_shape_with_order((self.num_verts, 3))
                .unwrap()
    }

    /// Rest joint positions regressed from a shaped template, (`num_joints`, 3).
    /// The regression is linear over the homogeneous-padded flat vertices.
    pub fn verts2joints(&self, verts: &nd::Array2<T>) -> nd::Array2<T> {
        let flat = verts
            .view()
            .into_shape_with_order(self.num_verts * 3)
            .unwrap();
        let joints = self.joint_regressor.dot(&flat.pad_ones());
        joints
            .into_shape_with_order((self.num_joints, 3))
            .unwrap()
    }

    /// Pose feature driving the pose blend shapes, matching the kind the
    /// archive was trained against.
    pub fn compute_pose_feature(&self, rotvecs: nd::ArrayView2<T>) -> nd::Array1<T> {
        match self.pose_feature_kind {
            PoseFeatureKind::Quaternion => batch_quat_feature(rotvecs),
            PoseFeatureKind::RotationMatrix => lrotmin(rotvecs),
        }
    }

    /// Per-vertex offsets for one pose feature vector, (`num_verts`, 3).
    pub fn compute_pose_correctives(&self, pose_feature: &nd::Array1<T>) -> nd::Array2<T> {
        let offsets = self.pose_dirs.dot(pose_feature);
        offsets
            .into_shape_with_order((self.num_verts, 3))
            .unwrap()
    }

    /// Skins one shaped sample: composes the rigid chain, blends the
    /// joint-local transforms per vertex through the skinning weights and
    /// applies them to the homogeneous rest positions. Returns the deformed
    /// vertices and the posed joint positions.
    pub fn apply_pose(
        &self,
        v_posed: &nd::Array2<T>,
        joints: &nd::Array2<T>,
        rotvecs: nd::ArrayView2<T>,
    ) -> (nd::Array2<T>, nd::Array2<T>) {
        let rot_mats = batch_rodrigues(rotvecs);
        let (posed_joints, rel_transforms) = batch_rigid_transform(
            &self.parent_idx_per_joint,
            &self.traversal_order,
            &rot_mats,
            joints,
        );

        let transforms_flat = rel_transforms
            .into_shape_with_order((self.num_joints, 16))
            .unwrap();
        let blended = self.lbs_weights.dot(&transforms_flat); //(num_verts, 16)
        let rest_h = v_posed.pad_ones(); //(num_verts, 4)

        let mut verts = nd::Array2::<T>::zeros((self.num_verts, 3));
        for ((mut vert_out, blended_tf), vert_h) in verts
            .axis_iter_mut(nd::Axis(0))
            .zip(blended.axis_iter(nd::Axis(0)))
            .zip(rest_h.axis_iter(nd::Axis(0)))
        {
            for row in 0..3 {
                let mut acc = T::zero();
                for col in 0..4 {
                    acc = acc + blended_tf[4 * row + col] * vert_h[col];
                }
                vert_out[row] = acc;
            }
        }

        (verts, posed_joints)
    }

    /// Batched forward evaluation.
    ///
    /// `pose` is (batch, 3 * `num_joints`) axis-angle values, `betas`
    /// (batch, <= `num_betas`) and `trans` (batch, 3). The batch size is
    /// taken from `pose` and must match across all three. Pure: the stored
    /// arrays are only read, so concurrent calls on one container are fine.
    pub fn evaluate(
        &self,
        pose: &nd::Array2<T>,
        betas: &nd::Array2<T>,
        trans: &nd::Array2<T>,
    ) -> Result<SuprOutput<T>, ShapeError> {
        let batch_size = pose.nrows();
        if betas.nrows() != batch_size || trans.nrows() != batch_size {
            return Err(ShapeError::BatchMismatch {
                pose: batch_size,
                betas: betas.nrows(),
                trans: trans.nrows(),
            });
        }
        if pose.ncols() != 3 * self.num_joints {
            return Err(ShapeError::PoseLength {
                got: pose.ncols(),
                num_joints: self.num_joints,
            });
        }
        if betas.ncols() > self.num_betas {
            return Err(ShapeError::TooManyBetas {
                got: betas.ncols(),
                available: self.num_betas,
            });
        }
        if trans.ncols() != 3 {
            return Err(ShapeError::TransLength { got: trans.ncols() });
        }

        let mut verts = nd::Array3::<T>::zeros((batch_size, self.num_verts, 3));
        let mut joints = nd::Array3::<T>::zeros((batch_size, self.num_joints, 3));
        for idx in 0..batch_size {
            let rotvecs = pose
                .row(idx)
                .to_owned()
                .into_shape_with_order((self.num_joints, 3))
                .unwrap();

            let v_shaped = self.betas2verts(betas.row(idx));
            let joints_rest = self.verts2joints(&v_shaped);

            let pose_feature = self.compute_pose_feature(rotvecs.view());
            let v_posed = v_shaped + self.compute_pose_correctives(&pose_feature);

            let (v_final, joints_final) =
                self.apply_pose(&v_posed, &joints_rest, rotvecs.view());

            let sample_trans = trans.row(idx);
            verts
                .slice_mut(s![idx, .., ..])
                .assign(&(&v_final + &sample_trans));
            joints
                .slice_mut(s![idx, .., ..])
                .assign(&(&joints_final + &sample_trans));
        }

        Ok(SuprOutput {
            verts,
            joints,
            pose: pose.clone(),
            betas: betas.clone(),
            trans: trans.clone(),
        })
    }
}

fn read_array<R, S, D>(
    npz: &mut NpzReader<R>,
    name: &'static str,
) -> Result<nd::ArrayBase<S, D>, LoadError>
where
    R: Read + Seek,
    S: nd::DataOwned,
    S::Elem: ndarray_npy::ReadableElement,
    D: nd::Dimension,
{
    npz.by_name(name)
        .map_err(|source| LoadError::Array { name, source })
}

/// Parent-before-child joint order for an arbitrary parent table rooted at
/// joint 0. Fails on out-of-range parents and on tables whose graph is
/// cyclic or not fully reachable from the root.
fn kinematic_traversal(parent_idx_per_joint: &[usize]) -> Result<Vec<usize>, LoadError> {
    let num_joints = parent_idx_per_joint.len();
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); num_joints];
    for (joint, &parent) in parent_idx_per_joint.iter().enumerate().skip(1) {
        if parent >= num_joints {
            return Err(LoadError::InvalidKinematicTree {
                message: format!("joint {joint} has out-of-range parent {parent}"),
            });
        }
        children[parent].push(joint);
    }

    let mut order = Vec::with_capacity(num_joints);
    let mut queue = VecDeque::from([0usize]);
    while let Some(joint) = queue.pop_front() {
        order.push(joint);
        queue.extend(children[joint].iter().copied());
    }
    if order.len() != num_joints {
        return Err(LoadError::InvalidKinematicTree {
            message: format!(
                "only {} of {num_joints} joints are reachable from the root",
                order.len()
            ),
        });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_orders_parents_first() {
        //joint 1 hangs off joint 2, which hangs off the root
        let order = kinematic_traversal(&[0, 2, 0]).unwrap();
        let pos = |j: usize| order.iter().position(|&x| x == j).unwrap();
        assert_eq!(order[0], 0);
        assert!(pos(2) < pos(1));
    }

    #[test]
    fn traversal_rejects_cycles() {
        let err = kinematic_traversal(&[0, 2, 1]).unwrap_err();
        assert!(matches!(err, LoadError::InvalidKinematicTree { .. }));
    }

    #[test]
    fn traversal_rejects_out_of_range_parents() {
        let err = kinematic_traversal(&[0, 7, 0]).unwrap_err();
        assert!(matches!(err, LoadError::InvalidKinematicTree { .. }));
    }
}
