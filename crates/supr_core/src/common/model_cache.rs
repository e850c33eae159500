use enum_map::EnumMap;
use log::info;

use crate::common::errors::LoadError;
use crate::common::types::{Gender, Precision};
use crate::supr::SuprModel;

/// A model with its working precision erased, so callers can pick 32- or
/// 64-bit computation at load time and store either behind one type.
#[derive(Clone, Debug)]
pub enum SuprModelDynamic {
    F32(SuprModel<f32>),
    F64(SuprModel<f64>),
}

impl SuprModelDynamic {
    /// Loads an archive at the requested working precision.
    pub fn new_from_npz(
        precision: Precision,
        path: &str,
        gender: Gender,
        max_num_betas: usize,
    ) -> Result<Self, LoadError> {
        match precision {
            Precision::F32 => {
                info!("Initializing {gender} model with f32 precision");
                Ok(Self::F32(SuprModel::<f32>::new_from_npz(
                    path,
                    gender,
                    max_num_betas,
                )?))
            }
            Precision::F64 => {
                info!("Initializing {gender} model with f64 precision");
                Ok(Self::F64(SuprModel::<f64>::new_from_npz(
                    path,
                    gender,
                    max_num_betas,
                )?))
            }
        }
    }

    /// The precision the model was instantiated with.
    pub fn precision(&self) -> Precision {
        match self {
            Self::F32(_) => Precision::F32,
            Self::F64(_) => Precision::F64,
        }
    }

    pub fn gender(&self) -> Gender {
        match self {
            Self::F32(model) => model.gender,
            Self::F64(model) => model.gender,
        }
    }

    pub fn as_f32(&self) -> Option<&SuprModel<f32>> {
        match self {
            Self::F32(model) => Some(model),
            Self::F64(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<&SuprModel<f64>> {
        match self {
            Self::F64(model) => Some(model),
            Self::F32(_) => None,
        }
    }
}

/// Store for loaded models keyed by gender, with optional lazy-loading
/// paths resolved on first use.
#[derive(Default, Clone)]
pub struct SuprCache {
    gender_to_model: EnumMap<Gender, Option<SuprModelDynamic>>,
    gender_to_path: EnumMap<Gender, Option<String>>,
}

impl SuprCache {
    pub fn add_model(&mut self, model: SuprModelDynamic) {
        let gender = model.gender();
        self.gender_to_model[gender] = Some(model);
    }

    pub fn has_model(&self, gender: Gender) -> bool {
        self.gender_to_model[gender].is_some()
    }

    pub fn get_model_ref(&self, gender: Gender) -> Option<&SuprModelDynamic> {
        self.gender_to_model[gender].as_ref()
    }

    pub fn remove_all_models(&mut self) {
        self.gender_to_model = EnumMap::default();
    }

    /// Registers the archive path to load for `gender` when first requested.
    pub fn set_lazy_loading(&mut self, gender: Gender, path: &str) {
        self.gender_to_path[gender] = Some(path.to_string());
    }

    pub fn has_lazy_loading(&self, gender: Gender) -> bool {
        self.gender_to_path[gender].is_some()
    }

    pub fn get_lazy_loading(&self, gender: Gender) -> Option<String> {
        self.gender_to_path[gender].clone()
    }

    /// Returns the model for `gender`, loading it from its registered path
    /// if it is not resident yet.
    pub fn load_lazy(
        &mut self,
        gender: Gender,
        precision: Precision,
        max_num_betas: usize,
    ) -> Result<&SuprModelDynamic, LoadError> {
        if self.gender_to_model[gender].is_none() {
            let path = self.gender_to_path[gender]
                .clone()
                .ok_or_else(|| LoadError::NotRegistered {
                    gender: gender.to_string(),
                })?;
            let model = SuprModelDynamic::new_from_npz(precision, &path, gender, max_num_betas)?;
            self.gender_to_model[gender] = Some(model);
        }
        Ok(self.gender_to_model[gender].as_ref().unwrap())
    }
}
