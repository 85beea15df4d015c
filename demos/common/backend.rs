//! Backend the demos run on. When several `dev-*` features are on, the first one listed in
//! `Cargo.toml` wins.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

#[cfg(not(feature = "_dev-has-backend"))]
std::compile_error!("No dev backend selected. Enable one of the `dev-*` features.");

#[cfg(feature = "dev-f16")]
pub type Element = burn::tensor::f16;
#[cfg(not(feature = "dev-f16"))]
pub type Element = f32;

#[cfg(feature = "dev-ndarray")]
pub type MainBackend = burn::backend::NdArray<Element, i64>;

#[cfg(all(
    not(feature = "dev-ndarray"),
    any(feature = "dev-tch-cpu", feature = "dev-tch-gpu")
))]
pub type MainBackend = burn::backend::libtorch::LibTorch<Element, i64>;

#[cfg(all(
    not(any(feature = "dev-ndarray", feature = "dev-tch-cpu", feature = "dev-tch-gpu")),
    any(feature = "dev-wgpu", feature = "dev-metal", feature = "dev-vulkan")
))]
pub type MainBackend = burn::backend::wgpu::Wgpu<Element, i32>;

#[cfg(all(
    not(any(
        feature = "dev-ndarray",
        feature = "dev-tch-cpu",
        feature = "dev-tch-gpu",
        feature = "dev-wgpu",
        feature = "dev-metal",
        feature = "dev-vulkan"
    )),
    feature = "dev-cuda"
))]
pub type MainBackend = burn::backend::Cuda<Element, i32>;

pub type MainAutoBackend = burn::backend::Autodiff<MainBackend>;

/// Device the demos run on, per backend. Defaults to the backend's default device.
pub trait MainDevice: Backend {
    fn main_device() -> <Self as Backend>::Device {
        Default::default()
    }
}

impl MainDevice for MainBackend {
    // libtorch defaults to the cpu
    #[cfg(all(
        feature = "dev-tch-gpu",
        not(any(feature = "dev-ndarray", feature = "dev-tch-cpu"))
    ))]
    fn main_device() -> <Self as Backend>::Device {
        if cfg!(target_os = "macos") {
            burn::backend::libtorch::LibTorchDevice::Mps
        } else {
            burn::backend::libtorch::LibTorchDevice::Cuda(0)
        }
    }
}

impl MainDevice for MainAutoBackend {
    fn main_device() -> <Self as Backend>::Device {
        <<Self as AutodiffBackend>::InnerBackend as MainDevice>::main_device()
    }
}
