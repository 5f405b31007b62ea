//! Submission document serialization.

use label::Region;

use serde_json;
use std::io;

/// Detected regions for one test dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetRegions {
    pub dataset: String,
    pub regions: Vec<Region>,
}

/// Renders the submission as a JSON array of
/// `{"dataset": .., "regions": [{"coordinates": [[r, c], ..]}, ..]}`.
pub fn to_json(results: &[DatasetRegions]) -> serde_json::Result<String> {
    serde_json::to_string(results)
}

/// Writes the submission document to `writer`.
pub fn write_submission<W: io::Write>(writer: W,
                                      results: &[DatasetRegions])
                                      -> serde_json::Result<()> {
    serde_json::to_writer(writer, results)
}
