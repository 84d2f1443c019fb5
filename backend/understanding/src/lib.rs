pub mod clean_note;
pub mod image;
pub mod ocr;
pub mod structuring;

pub use clean_note::NoteCleaner;
pub use image::{decode_data_url, encode_data_url, encode_file, DecodedImage};
pub use ocr::{resolve_task, OcrService};
pub use structuring::{strip_code_fences, BillStructurer};
