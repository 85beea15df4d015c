use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::{Dataset, InMemDataset};
use burn::prelude::*;
use burn_dataset::network::downloader::download_file_as_bytes;
use flate2::read::GzDecoder;
use std::fs::{File, create_dir_all};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

// CVDF mirror of http://yann.lecun.com/exdb/mnist/
const URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";
const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

pub const WIDTH: usize = 28;
pub const HEIGHT: usize = 28;
pub const NUM_CLASSES: usize = 10;

/// Number of leading items of the training file that are held out for validation.
pub const VALIDATION_SIZE: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnistSplit {
    /// Training file items `VALIDATION_SIZE..`.
    Train,
    /// Training file items `..VALIDATION_SIZE`.
    Validation,
    /// The t10k file.
    Test,
}

impl MnistSplit {
    fn files(&self) -> (&'static str, &'static str) {
        match self {
            MnistSplit::Train | MnistSplit::Validation => (TRAIN_IMAGES, TRAIN_LABELS),
            MnistSplit::Test => (TEST_IMAGES, TEST_LABELS),
        }
    }
}

/// MNIST item.
#[derive(Debug, Clone, PartialEq)]
pub struct MnistItem {
    /// Row-major brightness values, in between 0 and 255.
    ///
    /// # Shape
    /// [HEIGHT * WIDTH]
    pub image: Vec<u8>,

    /// Label of the image.
    /// Each value is in between 0 and 9.
    pub label: u8,
}

/// The MNIST dataset consists of 70,000 28x28 black-and-white images in 10 classes (one for each digits).
/// There are 60,000 training images, the first [`VALIDATION_SIZE`] of which form the validation
/// split, and 10,000 test images.
pub struct MnistDataset {
    dataset: InMemDataset<MnistItem>,
}

impl Dataset<MnistItem> for MnistDataset {
    fn get(&self, index: usize) -> Option<MnistItem> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl MnistDataset {
    /// Creates a new train dataset, downloading the files if needed.
    pub fn train() -> io::Result<Self> {
        Self::new(MnistSplit::Train)
    }

    /// Creates a new validation dataset, downloading the files if needed.
    pub fn validation() -> io::Result<Self> {
        Self::new(MnistSplit::Validation)
    }

    /// Creates a new test dataset, downloading the files if needed.
    pub fn test() -> io::Result<Self> {
        Self::new(MnistSplit::Test)
    }

    pub fn new(split: MnistSplit) -> io::Result<Self> {
        let root = Self::download(split)?;
        Self::from_dir(&root, split)
    }

    /// Reads the split from a directory holding the IDX files, either raw or gzipped
    /// (with a `.gz` suffix).
    pub fn from_dir(root: &Path, split: MnistSplit) -> io::Result<Self> {
        let (images_name, labels_name) = split.files();

        // MNIST is tiny so we can load it in-memory
        // Train images (u8): 28 * 28 * 60000 = 47.04Mb
        // Test images (u8): 28 * 28 * 10000 = 7.84Mb
        let images = read_images(open_idx(root, images_name)?)?;
        let labels = read_labels(open_idx(root, labels_name)?)?;
        if images.len() != labels.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} images but {} labels in {root:?}",
                    images.len(),
                    labels.len()
                ),
            ));
        }

        let items: Vec<MnistItem> = images
            .into_iter()
            .zip(labels)
            .map(|(image, label)| MnistItem { image, label })
            .collect();

        Ok(Self::from_items(split_items(items, split, VALIDATION_SIZE)))
    }

    pub fn from_items(items: Vec<MnistItem>) -> Self {
        Self {
            dataset: InMemDataset::new(items),
        }
    }

    /// Download the MNIST dataset files from the web.
    fn download(split: MnistSplit) -> io::Result<PathBuf> {
        // Dataset files are stored in the burn-dataset cache directory
        let cache_dir = dirs::home_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no home directory"))?
            .join(".cache")
            .join("burn-dataset");
        let dir = cache_dir.join("mnist");
        create_dir_all(&dir)?;

        let (images_name, labels_name) = split.files();
        Self::download_file(images_name, &dir)?;
        Self::download_file(labels_name, &dir)?;

        Ok(dir)
    }

    /// Download a file from the MNIST dataset URL to the destination directory.
    fn download_file(name: &str, dest_dir: &Path) -> io::Result<PathBuf> {
        let file_name = dest_dir.join(name);

        if !file_name.exists() {
            // Download gzip file
            let bytes = download_file_as_bytes(&format!("{URL}{name}.gz"), name);

            // Decode gzip file content and write to disk
            let mut output_file = File::create(&file_name)?;
            let mut gz_buffer = GzDecoder::new(&bytes[..]);
            io::copy(&mut gz_buffer, &mut output_file)?;
        }

        Ok(file_name)
    }
}

fn split_items(mut items: Vec<MnistItem>, split: MnistSplit, validation_size: usize) -> Vec<MnistItem> {
    let validation_size = validation_size.min(items.len());
    match split {
        MnistSplit::Train => items.split_off(validation_size),
        MnistSplit::Validation => {
            items.truncate(validation_size);
            items
        }
        MnistSplit::Test => items,
    }
}

fn open_idx(root: &Path, name: &str) -> io::Result<Box<dyn Read>> {
    let raw = root.join(name);
    if raw.exists() {
        return Ok(Box::new(File::open(raw)?));
    }
    let gz = root.join(format!("{name}.gz"));
    Ok(Box::new(GzDecoder::new(File::open(gz)?)))
}

const IMAGES_MAGIC: u32 = 0x0803;
const LABELS_MAGIC: u32 = 0x0801;

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Reads exactly `len` bytes, without trusting `len` for the allocation.
fn read_body<R: Read>(reader: R, len: usize) -> io::Result<Vec<u8>> {
    let mut body = Vec::new();
    reader.take(len as u64).read_to_end(&mut body)?;
    if body.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, found {}", body.len()),
        ));
    }
    Ok(body)
}

/// Reads an IDX3 image file: 16-byte header (magic `0x0803`, then big-endian u32 count,
/// rows and columns), then one `HEIGHT * WIDTH` byte block per image.
pub fn read_images<R: Read>(mut reader: R) -> io::Result<Vec<Vec<u8>>> {
    let mut header = [0u8; 16];
    reader.read_exact(&mut header)?;
    let magic = be_u32(&header[0..4]);
    if magic != IMAGES_MAGIC {
        return Err(invalid_data(format!("not an IDX3 image file (magic {magic:#06x})")));
    }
    let size = be_u32(&header[4..8]) as usize;
    let rows = be_u32(&header[8..12]) as usize;
    let cols = be_u32(&header[12..16]) as usize;
    if (rows, cols) != (HEIGHT, WIDTH) {
        return Err(invalid_data(format!(
            "expected {HEIGHT}x{WIDTH} images, found {rows}x{cols}"
        )));
    }

    let buf_images = read_body(reader, WIDTH * HEIGHT * size)?;
    Ok(buf_images
        .chunks(WIDTH * HEIGHT)
        .map(|chunk| chunk.to_vec())
        .collect())
}

/// Reads an IDX1 label file: 8-byte header (magic `0x0801`, then the count), then one byte
/// per label.
pub fn read_labels<R: Read>(mut reader: R) -> io::Result<Vec<u8>> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let magic = be_u32(&header[0..4]);
    if magic != LABELS_MAGIC {
        return Err(invalid_data(format!("not an IDX1 label file (magic {magic:#06x})")));
    }
    let size = be_u32(&header[4..8]) as usize;
    read_body(reader, size)
}

#[derive(Clone, Default)]
pub struct MnistBatcher {}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// Brightness scaled into `[0, 1]`.
    ///
    /// # Shape
    /// [batch_size, HEIGHT, WIDTH]
    pub images: Tensor<B, 3>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> MnistBatch<B> {
    /// # Shape
    /// [batch_size, HEIGHT * WIDTH]
    pub fn images_flat(&self) -> Tensor<B, 2> {
        let [batch_size, height, width] = self.images.dims();
        self.images.clone().reshape([batch_size, height * width])
    }

    /// # Shape
    /// [batch_size, channels = 1, HEIGHT, WIDTH]
    pub fn images_nchw(&self) -> Tensor<B, 4> {
        self.images.clone().unsqueeze_dim(1)
    }
}

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let batch_size = items.len();
        let mut images: Vec<f32> = Vec::with_capacity(batch_size * HEIGHT * WIDTH);
        let mut labels: Vec<i64> = Vec::with_capacity(batch_size);
        for item in items {
            debug_assert_eq!(item.image.len(), HEIGHT * WIDTH);
            images.extend(item.image.iter().map(|&brightness| brightness as f32 / 255.));
            labels.push(item.label as i64);
        }

        let images = TensorData::new(images, [batch_size, HEIGHT, WIDTH]).convert::<B::FloatElem>();
        let targets = TensorData::new(labels, [batch_size]).convert::<B::IntElem>();

        MnistBatch {
            images: Tensor::from_data(images, device),
            targets: Tensor::from_data(targets, device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use std::io::Write;

    type B = NdArray<f32>;

    fn idx_images(images: &[Vec<u8>]) -> Vec<u8> {
        let mut bytes = vec![0, 0, 8, 3];
        bytes.extend((images.len() as u32).to_be_bytes());
        bytes.extend((HEIGHT as u32).to_be_bytes());
        bytes.extend((WIDTH as u32).to_be_bytes());
        for image in images {
            bytes.extend(image);
        }
        bytes
    }

    fn idx_labels(labels: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0, 0, 8, 1];
        bytes.extend((labels.len() as u32).to_be_bytes());
        bytes.extend(labels);
        bytes
    }

    fn items(n: usize) -> Vec<MnistItem> {
        (0..n)
            .map(|i| MnistItem {
                image: vec![i as u8; HEIGHT * WIDTH],
                label: (i % 10) as u8,
            })
            .collect()
    }

    #[test]
    fn reads_idx_headers_and_payload() {
        let images = vec![vec![7u8; HEIGHT * WIDTH], vec![255u8; HEIGHT * WIDTH]];
        let parsed = read_images(&idx_images(&images)[..]).unwrap();
        assert_eq!(parsed, images);

        let parsed = read_labels(&idx_labels(&[3, 9])[..]).unwrap();
        assert_eq!(parsed, vec![3, 9]);
    }

    #[test]
    fn truncated_file_is_an_error() {
        let mut bytes = idx_images(&[vec![1u8; HEIGHT * WIDTH]]);
        bytes.truncate(bytes.len() - 1);
        let err = read_images(&bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn header_is_checked() {
        // labels read as images
        let err = read_images(&idx_labels(&[1, 2])[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        let err = read_labels(&idx_images(&[vec![0u8; HEIGHT * WIDTH]])[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        // 32x32 images
        let mut bytes = vec![0, 0, 8, 3];
        bytes.extend(1u32.to_be_bytes());
        bytes.extend(32u32.to_be_bytes());
        bytes.extend(32u32.to_be_bytes());
        bytes.extend(vec![0u8; 32 * 32]);
        let err = read_images(&bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn corrupt_count_is_an_eof_error() {
        let mut bytes = idx_images(&[vec![1u8; HEIGHT * WIDTH]]);
        bytes[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = read_images(&bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut bytes = idx_labels(&[1, 2, 3]);
        bytes[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        let err = read_labels(&bytes[..]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn validation_is_the_head_of_the_training_file() {
        let train = split_items(items(8), MnistSplit::Train, 3);
        let validation = split_items(items(8), MnistSplit::Validation, 3);
        let test = split_items(items(8), MnistSplit::Test, 3);
        assert_eq!(train.len(), 5);
        assert_eq!(train[0].label, 3);
        assert_eq!(validation.len(), 3);
        assert_eq!(validation[2].label, 2);
        assert_eq!(test.len(), 8);

        // fewer items than the validation size
        assert!(split_items(items(2), MnistSplit::Train, 3).is_empty());
    }

    #[test]
    fn from_dir_reads_raw_and_gzipped_files() {
        let dir = temp_dir::TempDir::new().unwrap();
        let images: Vec<Vec<u8>> = items(3).into_iter().map(|item| item.image).collect();

        std::fs::write(dir.child(TEST_IMAGES), idx_images(&images)).unwrap();
        let mut gz = flate2::write::GzEncoder::new(
            File::create(dir.child(format!("{TEST_LABELS}.gz"))).unwrap(),
            flate2::Compression::default(),
        );
        gz.write_all(&idx_labels(&[4, 5, 6])).unwrap();
        gz.finish().unwrap();

        let dataset = MnistDataset::from_dir(dir.path(), MnistSplit::Test).unwrap();
        assert_eq!(dataset.len(), 3);
        let item = dataset.get(1).unwrap();
        assert_eq!(item.label, 5);
        assert_eq!(item.image, vec![1u8; HEIGHT * WIDTH]);
    }

    #[test]
    fn mismatched_counts_are_rejected() {
        let dir = temp_dir::TempDir::new().unwrap();
        let images: Vec<Vec<u8>> = items(2).into_iter().map(|item| item.image).collect();
        std::fs::write(dir.child(TEST_IMAGES), idx_images(&images)).unwrap();
        std::fs::write(dir.child(TEST_LABELS), idx_labels(&[1])).unwrap();

        let err = MnistDataset::from_dir(dir.path(), MnistSplit::Test).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn batcher_scales_and_shapes() {
        let device = Default::default();
        let mut batch_items = items(2);
        batch_items[1].image = vec![255u8; HEIGHT * WIDTH];
        let batch: MnistBatch<B> = MnistBatcher::default().batch(batch_items, &device);

        assert_eq!([2, HEIGHT, WIDTH], batch.images.dims());
        assert_eq!([2, HEIGHT * WIDTH], batch.images_flat().dims());
        assert_eq!([2, 1, HEIGHT, WIDTH], batch.images_nchw().dims());

        let values = batch.images.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values[0], 0.);
        assert_eq!(values[HEIGHT * WIDTH], 1.);
        let targets = batch.targets.into_data().to_vec::<i64>().unwrap();
        assert_eq!(targets, vec![0, 1]);
    }
}
