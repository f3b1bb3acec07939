//! Decay-aware coin selection algorithm.
//!
//! Selects UTXOs to spend with a preference for high-decay outputs first,
//! minimizing the total value lost to decay. This is the greedy strategy:
//! spend the coins that are decaying the fastest before they lose more value.

use rill_core::constants::CONCENTRATION_PRECISION;
use rill_core::traits::{ChainState, DecayCalculator};
use rill_core::types::{OutPoint, UtxoEntry};

use crate::error::WalletError;

/// A UTXO annotated with decay-adjusted values for coin selection.
#[derive(Debug, Clone)]
pub struct WalletUtxo {
    /// The outpoint identifying this UTXO.
    pub outpoint: OutPoint,
    /// The UTXO entry from the chain state.
    pub entry: UtxoEntry,
    /// Effective (post-decay) value in rills.
    pub effective_value: u64,
    /// Nominal (pre-decay) value in rills.
    pub nominal_value: u64,
    /// Amount decayed away in rills.
    pub decay_amount: u64,
}

/// Result of coin selection: which UTXOs to spend and the fee/change breakdown.
#[derive(Debug, Clone)]
pub struct CoinSelection {
    /// Selected UTXOs to spend.
    pub selected: Vec<WalletUtxo>,
    /// Total nominal value of selected UTXOs.
    pub total_nominal: u64,
    /// Total effective (post-decay) value of selected UTXOs.
    pub total_effective: u64,
    /// Total decay on selected UTXOs.
    pub total_decay: u64,
    /// Change amount to return to the sender (in rills).
    pub change: u64,
    /// Transaction fee in rills.
    pub fee: u64,
}

/// Decay-aware coin selector.
///
/// Sorts UTXOs by decay amount descending (highest-decay first) to minimize
/// value loss, then greedily selects until the target plus fee is met.
pub struct CoinSelector;

impl CoinSelector {
    /// Select UTXOs to meet a target amount.
    ///
    /// # Arguments
    /// - `utxos` — available wallet UTXOs (outpoint + entry pairs)
    /// - `target` — the amount to send in rills (excluding fee)
    /// - `base_fee` — fixed portion of the fee in rills
    /// - `fee_per_input` — additional fee per input consumed
    /// - `decay_calc` — decay calculator for effective value computation
    /// - `chain_state` — chain state for cluster balance and supply lookups
    /// - `height` — current block height for decay computation
    pub fn select(
        utxos: &[(OutPoint, UtxoEntry)],
        target: u64,
        base_fee: u64,
        fee_per_input: u64,
        decay_calc: &dyn DecayCalculator,
        chain_state: &dyn ChainState,
        height: u64,
    ) -> Result<CoinSelection, WalletError> {
        if utxos.is_empty() {
            return Err(WalletError::NoUtxos);
        }

        if target == 0 {
            return Err(WalletError::InvalidAmount("target must be non-zero".into()));
        }

        let supply = chain_state
            .circulating_supply()
            .map_err(|e| WalletError::BuildError(e.to_string()))?;

        // Build annotated UTXOs with decay info
        let mut wallet_utxos: Vec<WalletUtxo> = Vec::with_capacity(utxos.len());
        for (outpoint, entry) in utxos {
            let nominal = entry.output.value;
            let blocks_held = height.saturating_sub(entry.block_height);

            // Compute concentration: cluster_balance * CONCENTRATION_PRECISION / supply
            let cluster_bal = chain_state
                .cluster_balance(&entry.cluster_id)
                .map_err(|e| WalletError::BuildError(e.to_string()))?;
            let concentration = if supply > 0 {
                ((cluster_bal as u128) * (CONCENTRATION_PRECISION as u128)
                    / (supply as u128)) as u64
            } else {
                0
            };

            let effective = decay_calc
                .effective_value(nominal, concentration, blocks_held)
                .map_err(WalletError::Decay)?;

            let decay_amount = nominal.saturating_sub(effective);

            wallet_utxos.push(WalletUtxo {
                outpoint: outpoint.clone(),
                entry: entry.clone(),
                effective_value: effective,
                nominal_value: nominal,
                decay_amount,
            });
        }

        // Sort by decay_amount descending (spend highest-decay first),
        // then by effective_value ascending (prefer smaller UTXOs as tiebreaker)
        wallet_utxos.sort_by(|a, b| {
            b.decay_amount
                .cmp(&a.decay_amount)
                .then(a.effective_value.cmp(&b.effective_value))
        });

        // Greedy selection
        let mut selected = Vec::new();
        let mut total_effective: u64 = 0;
        let mut total_nominal: u64 = 0;
        let mut total_decay: u64 = 0;

        for utxo in wallet_utxos {
            selected.push(utxo.clone());
            total_effective = total_effective.saturating_add(utxo.effective_value);
            total_nominal = total_nominal.saturating_add(utxo.nominal_value);
            total_decay = total_decay.saturating_add(utxo.decay_amount);

            let fee = base_fee.saturating_add(
                fee_per_input.saturating_mul(selected.len() as u64),
            );
            let needed = target.saturating_add(fee);

            if total_effective >= needed {
                let change = total_effective.saturating_sub(needed);
                return Ok(CoinSelection {
                    selected,
                    total_nominal,
                    total_effective,
                    total_decay,
                    change,
                    fee,
                });
            }
        }

        // Not enough funds
        let fee = base_fee.saturating_add(
            fee_per_input.saturating_mul(selected.len() as u64),
        );
        Err(WalletError::InsufficientFunds {
            have: total_effective,
            need: target.saturating_add(fee),
        })
    }
}
