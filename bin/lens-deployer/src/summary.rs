use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use lens_deploy::{DeploymentLedger, VerificationOutcome, VerificationRequest};

fn table(header: [&str; 3]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

/// One row per published role, with the verification outcome of the task
/// that produced it. Companion roles have no outcome of their own.
pub fn ledger_table(ledger: &DeploymentLedger) -> Table {
    let mut table = table(["Role", "Address", "Verification"]);

    for entry in ledger.entries() {
        let verification = ledger
            .verifications()
            .iter()
            .find(|record| record.address == entry.address)
            .map(|record| record.outcome.to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row([
            entry.role.clone(),
            entry.address.to_checksum(None),
            verification,
        ]);
    }

    table
}

pub fn verification_table(request: &VerificationRequest, outcome: &VerificationOutcome) -> Table {
    let mut table = table(["Contract", "Address", "Verification"]);
    table.add_row([
        request.contract_source_id.clone(),
        request.address.to_checksum(None),
        outcome.to_string(),
    ]);
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::Address;
    use lens_deploy::VerificationRecord;

    #[test]
    fn test_ledger_table_rows() {
        let mut ledger = DeploymentLedger::new();
        ledger.record("LENS_FACTORY", Address::repeat_byte(0x11));
        ledger.record("GLOBAL_FEED_ACCESS_CONTROL", Address::repeat_byte(0x22));
        ledger.record_verification(VerificationRecord {
            task: "LensFactory".to_string(),
            contract: "contracts/LensFactory.sol:LensFactory".to_string(),
            address: Address::repeat_byte(0x11),
            outcome: VerificationOutcome::Verified,
        });

        let rendered = ledger_table(&ledger).to_string();
        assert!(rendered.contains("LENS_FACTORY"));
        assert!(rendered.contains("verified"));
        assert!(rendered.contains("GLOBAL_FEED_ACCESS_CONTROL"));
        assert_eq!(ledger_table(&ledger).row_iter().count(), 2);
    }
}
