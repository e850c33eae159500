use thiserror::Error;

/// Errors surfaced while loading a model archive. All of these are fatal;
/// nothing is retried.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open model archive '{path}': {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed model archive: {0}")]
    Archive(#[from] ndarray_npy::ReadNpzError),

    #[error("failed to read array '{name}' from model archive: {source}")]
    Array {
        name: &'static str,
        source: ndarray_npy::ReadNpzError,
    },

    #[error("inconsistent array shapes: {message}")]
    ShapeMismatch { message: String },

    #[error("invalid kinematic tree: {message}")]
    InvalidKinematicTree { message: String },

    #[error("no model or lazy-loading path registered for {gender}")]
    NotRegistered { gender: String },
}

/// Per-call input shape errors. The shared container is never touched, so a
/// failed call leaves it usable.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("batch size mismatch: pose has {pose} rows, betas {betas}, trans {trans}")]
    BatchMismatch {
        pose: usize,
        betas: usize,
        trans: usize,
    },

    #[error("pose rows have {got} values but the model has {num_joints} joints (expected 3 * {num_joints})")]
    PoseLength { got: usize, num_joints: usize },

    #[error("requested {got} betas but the shape basis provides {available}")]
    TooManyBetas { got: usize, available: usize },

    #[error("translation rows must have 3 components, got {got}")]
    TransLength { got: usize },
}
