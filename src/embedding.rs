/*!
Patch embedding.

The pipeline only needs "patch in, fixed-length vector out". `PatchEmbedder`
is that capability; `TorchEmbedder` provides it from a TorchScript module
exported by the training side.
 */
use std::path::Path;
use std::sync::Mutex;

use tch::{CModule, Device, Kind, Tensor};

use crate::error::{Error, Result};
use crate::patches::Patch;

/// Must be deterministic and keep no state between patches.
pub trait PatchEmbedder: Sync {
    fn embed(&self, patch: &Patch<'_>) -> Result<Vec<f32>>;
}

pub struct TorchEmbedder {
    module: Mutex<CModule>,
    device: Device,
}

impl TorchEmbedder {
    pub fn load(path: &Path, device: Device) -> Result<Self> {
        let mut module = CModule::load_on_device(path, device)?;
        module.set_eval();
        Ok(Self {
            module: Mutex::new(module),
            device,
        })
    }
}

impl PatchEmbedder for TorchEmbedder {
    fn embed(&self, patch: &Patch<'_>) -> Result<Vec<f32>> {
        let (height, width, channels) = patch.pixels.dim();
        let data = patch.pixels.iter().copied().collect::<Vec<_>>();
        let input /* [1, C, H, W] */ = Tensor::of_slice(&data)
            .view((height as i64, width as i64, channels as i64))
            .permute(&[2, 0, 1])
            .unsqueeze(0)
            .to_device(self.device);

        let output = {
            let module = self
                .module
                .lock()
                .map_err(|_| Error::Configuration("embedding module lock poisoned".into()))?;
            tch::no_grad(|| module.forward_ts(&[input]))?
        };

        let output = output.to_kind(Kind::Float).to_device(Device::Cpu).flatten(0, -1);
        let numel = output.numel();
        let mut embedding = vec![0f32; numel];
        output.copy_data(&mut embedding, numel);
        Ok(embedding)
    }
}
