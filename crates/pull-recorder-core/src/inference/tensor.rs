use crate::{
    CoreResult,
    capture::{Dimensions, RawFrame},
    inference::InputTensor,
    sampler::{FrameSample, resize_rgba},
};

/// Detector input size.
pub const MODEL_INPUT: Dimensions = Dimensions::new(384, 384);

/// ImageNet per-channel mean (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet per-channel standard deviation (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize a sample to `input` and normalize it into a `[1, 3, H, W]` tensor.
///
/// Alpha is dropped. Each channel is scaled to `[0, 1]` and then
/// standardized with the ImageNet statistics.
pub fn preprocess(sample: FrameSample, input: Dimensions) -> CoreResult<InputTensor> {
    let frame = RawFrame {
        rgba: sample.pixels,
        width: sample.width,
        height: sample.height,
    };
    let rgba = resize_rgba(frame, input)?;

    let plane = input.width as usize * input.height as usize;
    let mut data = vec![0.0f32; plane * 3];

    for (i, px) in rgba.chunks_exact(4).enumerate() {
        for c in 0..3 {
            let v = px[c] as f32 / 255.0;
            data[c * plane + i] = (v - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }

    Ok(InputTensor {
        data,
        shape: [1, 3, input.height as usize, input.width as usize],
    })
}
