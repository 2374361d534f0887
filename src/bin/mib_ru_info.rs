//! Refresh the cached information of the readout units at MIB and CERN.
//!
//! Location ids come from `[locations]` in `mtd-parts.toml`; with the default
//! configuration `MTD_LOCATION_MIB` and `MTD_LOCATION_CERN` must be exported.

use mtd_parts::drivers::{run_preset, MIB_RU_INFO};

#[tokio::main]
async fn main() {
    let code = run_preset(&MIB_RU_INFO).await;
    if code != 0 {
        std::process::exit(code);
    }
}
