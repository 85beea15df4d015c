mod dataset;

pub use dataset::{
    HEIGHT, MnistBatch, MnistBatcher, MnistDataset, MnistItem, MnistSplit, NUM_CLASSES,
    VALIDATION_SIZE, WIDTH, read_images, read_labels,
};
