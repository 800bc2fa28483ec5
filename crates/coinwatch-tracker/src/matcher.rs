//! Matching of transaction outputs against tracked scripts.

use crate::error::{Error, Result};
use crate::models::{Candidate, MatchedOutput};
use bitcoin::{Amount, Script, Transaction};
use std::collections::HashMap;

/// Returns the outputs of `tx` paying to one of `candidates`, in output order.
///
/// Scripts are compared byte for byte. When several candidates share a
/// script the first one wins.
pub fn match_outputs(tx: &Transaction, candidates: &[Candidate]) -> Result<Vec<MatchedOutput>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_script: HashMap<&Script, &Candidate> = HashMap::with_capacity(candidates.len());
    for candidate in candidates {
        by_script
            .entry(candidate.script_pubkey.as_script())
            .or_insert(candidate);
    }

    let mut matches = Vec::new();

    for (index, output) in tx.output.iter().enumerate() {
        let output_index = u32::try_from(index)
            .map_err(|_| Error::TransactionData(format!("Output index {index} out of range")))?;

        if output.value > Amount::MAX_MONEY {
            return Err(Error::TransactionData(format!(
                "Output {output_index} value {} exceeds the money supply",
                output.value.to_sat()
            )));
        }

        let Some(candidate) = by_script.get(output.script_pubkey.as_script()) else {
            continue;
        };

        matches.push(MatchedOutput {
            key_path: candidate.key_path.clone(),
            script_pubkey: output.script_pubkey.clone(),
            redeem_script: candidate.redeem_script.clone(),
            output_index,
            value: output.value,
        });
    }

    tracing::trace!(
        outputs = tx.output.len(),
        candidates = candidates.len(),
        matched = matches.len(),
        "Matched transaction outputs"
    );

    Ok(matches)
}
