use log::warn;
use ndarray as nd;

use supr_core::common::types::Gender;
use supr_core::supr::supr_model::{SuprModel, DEFAULT_NUM_BETAS, NUM_JOINTS, NUM_VERTS};

fn main() {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "./data/supr/supr_neutral.npz".to_string());

    let model = match SuprModel::<f32>::new_from_npz(&path, Gender::Neutral, DEFAULT_NUM_BETAS) {
        Ok(model) => model,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };
    if model.num_joints() != NUM_JOINTS || model.num_verts() != NUM_VERTS {
        warn!(
            "archive has {} joints / {} verts, canonical SUPR has {NUM_JOINTS} / {NUM_VERTS}",
            model.num_joints(),
            model.num_verts()
        );
    }

    //rest pose for a single batch element
    let pose = nd::Array2::<f32>::zeros((1, 3 * model.num_joints()));
    let betas = nd::Array2::<f32>::zeros((1, model.num_betas()));
    let trans = nd::Array2::<f32>::zeros((1, 3));

    let output = model
        .evaluate(&pose, &betas, &trans)
        .expect("rest-pose buffers match the model dimensions");

    println!("verts  {:?}", output.verts.shape());
    println!("joints {:?}", output.joints.shape());
    for idx in 0..model.num_verts().min(3) {
        println!("v[{idx}] = {}", output.verts.slice(nd::s![0, idx, ..]));
    }
}
