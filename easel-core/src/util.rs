use anyhow::Result;
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, DeviceLocation, Tensor};
use image::DynamicImage;
use tracing::warn;

use crate::DeviceMap;

/// Resolves a device map to a concrete device.
///
/// An ordinal with no CUDA or Metal device behind it is an error, never the CPU.
pub fn select_device(device_map: DeviceMap) -> Result<Device> {
    match device_map {
        DeviceMap::ForceCpu => Ok(Device::Cpu),
        DeviceMap::Ordinal(ordinal) if cuda_is_available() => Ok(Device::new_cuda(ordinal)?),
        DeviceMap::Ordinal(ordinal) if metal_is_available() => Ok(Device::new_metal(ordinal)?),
        DeviceMap::Ordinal(ordinal) => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            {
                warn!("no accelerator compiled in, build with `--features metal` to run on GPU");
            }
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            {
                warn!("no accelerator compiled in, build with `--features cuda` to run on GPU");
            }
            anyhow::bail!("no accelerator available for device ordinal {ordinal}")
        }
    }
}

pub fn describe_device(device: &Device) -> String {
    match device.location() {
        DeviceLocation::Cpu => "cpu".to_string(),
        DeviceLocation::Cuda { gpu_id } => format!("cuda:{gpu_id}"),
        DeviceLocation::Metal { gpu_id } => format!("metal:{gpu_id}"),
    }
}

/// Converts a u8 tensor with shape (3, height, width) into an RGB image.
pub fn tensor_to_image(img: &Tensor) -> Result<DynamicImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        anyhow::bail!("tensor_to_image expects an image with 3 channels, got {channels}");
    }
    let img = img.permute((1, 2, 0))?.flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    let buffer = image::ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .ok_or_else(|| candle_core::Error::msg("error converting tensor to image buffer"))?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn cpu_is_always_selectable() {
        assert!(select_device(DeviceMap::ForceCpu).unwrap().is_cpu());
    }

    #[test]
    fn missing_accelerator_is_an_error() {
        if cuda_is_available() || metal_is_available() {
            return;
        }
        let err = select_device(DeviceMap::Ordinal(0)).unwrap_err();
        assert!(err.to_string().contains("no accelerator"));
    }

    #[test]
    fn tensor_channels_become_pixels() {
        // 3 channels, 1 row, 2 columns: red then blue.
        let data: Vec<u8> = vec![255, 0, 0, 0, 0, 255];
        let tensor = Tensor::from_vec(data, (3, 1, 2), &Device::Cpu).unwrap();
        let img = tensor_to_image(&tensor).unwrap();
        assert_eq!(img.dimensions(), (2, 1));
        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn rejects_non_rgb_tensor() {
        let tensor = Tensor::zeros((1, 4, 4), candle_core::DType::U8, &Device::Cpu).unwrap();
        assert!(tensor_to_image(&tensor).is_err());
    }
}
