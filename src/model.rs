use burn::prelude::*;

/// A model configuration that knows which module it initializes.
///
/// Used to load or create models generically, e.g. when restoring checkpoints.
pub trait ModelConfigExt<B: Backend>: Config {
    type Model: Module<B>;
    fn init(&self, device: &B::Device) -> Self::Model;
}
