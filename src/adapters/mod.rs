// Adapters layer: CSV decoding of the exports and rendering of the report bundle.

pub mod csv_source;
pub mod report_writer;
