pub mod destination;
pub mod series;
pub mod source;

/// Column layout shared by the reader and the writer.
pub const HEADERS: [&str; 3] = ["series", "timestamp", "value"];
