//! Forward evaluator for the SUPR parametric human body model.
//!
//! A [`SuprModel`](supr::SuprModel) owns the immutable arrays loaded once
//! from an `.npz` archive (template mesh, shape and pose blend-shape bases,
//! joint regressor, skinning weights, kinematic tree) and exposes a single
//! batched entry point, [`evaluate`](supr::SuprModel::evaluate), mapping
//! axis-angle joint poses, shape betas and a global translation to deformed
//! mesh vertices and joint positions.
//!
//! The container is immutable after load and safe to share across threads;
//! every evaluation call is a pure function of its inputs.
pub mod common;
pub mod supr;
