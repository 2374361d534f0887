//! Refresh the cached information of the detector modules at CIT.
//!
//! Location ids come from `[locations]` in `mtd-parts.toml`; with the default
//! configuration `MTD_LOCATION_CIT` must be exported.

use mtd_parts::drivers::{run_preset, CIT_DM_INFO};

#[tokio::main]
async fn main() {
    let code = run_preset(&CIT_DM_INFO).await;
    if code != 0 {
        std::process::exit(code);
    }
}
