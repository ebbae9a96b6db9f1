pub mod aggregate;
pub mod detection_csv;
pub mod error;
pub mod loader;
pub mod messages;
pub mod normalize;

pub use aggregate::{
    aggregate_raw_detections, key_from_image_path, summarize_image, AggregatedDetections,
    RawImageDetections,
};
pub use detection_csv::{read_detection_csv, write_detection_csv, ParsedDetections};
pub use error::IngestError;
pub use loader::{load_detections, load_raw_messages, DetectionLoadReport, MessageLoadReport};
pub use messages::{discover_message_files, read_message_files, ParsedMessages};
pub use normalize::normalize_message;
