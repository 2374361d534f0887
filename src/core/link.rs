use crate::domain::model::{Catalog, DetectorModule, ReadoutUnit, SensorModule, SiPMArray};

/// Resolve child barcodes to records: SM → SiPM first, then DM → SM, so the
/// SMs placed into DMs already carry their SiPMs. Unknown barcodes stay as is.
pub fn combine_parts(
    sipms: &Catalog<SiPMArray>,
    sms: &mut Catalog<SensorModule>,
    dms: &mut Catalog<DetectorModule>,
) {
    for sm in sms.values_mut().flatten() {
        for link in [&mut sm.sipm1, &mut sm.sipm2].into_iter().flatten() {
            link.resolve(sipms);
        }
    }

    for dm in dms.values_mut().flatten() {
        for link in [&mut dm.sm1, &mut dm.sm2].into_iter().flatten() {
            link.resolve(sms);
        }
    }
}

/// Resolve readout-unit DM links against an already combined DM catalog.
pub fn attach_detector_modules(dms: &Catalog<DetectorModule>, rus: &mut Catalog<ReadoutUnit>) {
    for ru in rus.values_mut().flatten() {
        for link in ru.dms.iter_mut() {
            link.resolve(dms);
        }
    }
}
