//! Atomic transaction composition for a validated cycle
//!
//! One transaction carries the whole cycle: compute budget instructions
//! first, then a single swap-agent instruction whose on-chain program walks
//! the hops and aborts the lot if any leg underfills its minimum out.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use spl_associated_token_account::get_associated_token_address;
use tracing::debug;
use uuid::Uuid;

use crate::pathfinder::{Opportunity, PlannedHop};
use crate::shared::errors::EngineError;
use crate::shared::types::BPS_DENOMINATOR;
use crate::validator::Revalidation;

/// Instruction discriminator of the swap-agent's execute entrypoint.
const EXECUTE_SWAP_DISCRIMINATOR: u8 = 1;

const PDA_SEED: &[u8] = b"swap_agent";

/// Compute unit sizing: fixed transaction overhead plus a per-hop slice.
const BASE_TX_UNITS: u32 = 80_000;
const UNITS_PER_HOP: u32 = 120_000;

/// One leg of the on-chain swap instruction, wire layout fixed by the
/// swap-agent program.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SwapLeg {
    pub dex_type: u8,
    pub amount_in: u64,
    pub minimum_amount_out: u64,
    pub mint_in: [u8; 32],
    pub mint_out: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct SwapData {
    pub expected_profit: u64,
    pub slippage_bps: u16,
    pub swap_instructions: Vec<SwapLeg>,
}

/// Fully assembled, unsigned transaction with its validity window.
pub struct TransactionPlan {
    pub id: Uuid,
    pub instructions: Vec<Instruction>,
    pub payer: Pubkey,
    pub recent_blockhash: Hash,
    /// Block height past which the blockhash, and so the whole plan, is dead.
    pub last_valid_block_height: u64,
    pub amount_in: u64,
    pub expected_profit: u64,
    pub start_token: Pubkey,
    pub hop_count: usize,
}

impl TransactionPlan {
    pub fn into_signed_transaction(self, keypair: &Keypair) -> Transaction {
        Transaction::new_signed_with_payer(
            &self.instructions,
            Some(&self.payer),
            &[keypair],
            self.recent_blockhash,
        )
    }
}

pub struct Composer {
    program_id: Pubkey,
    slippage_bps: u16,
    compute_unit_limit: u32,
    compute_unit_price_micro_lamports: u64,
}

impl Composer {
    pub fn new(
        program_id: Pubkey,
        slippage_bps: u16,
        compute_unit_limit: u32,
        compute_unit_price_micro_lamports: u64,
    ) -> Self {
        Self {
            program_id,
            slippage_bps,
            compute_unit_limit,
            compute_unit_price_micro_lamports,
        }
    }

    /// Swap-agent state PDA for an authority.
    pub fn agent_address(&self, authority: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[PDA_SEED, authority.as_ref()], &self.program_id).0
    }

    /// Build the transaction plan for a revalidated cycle. Amounts come from
    /// the revalidation, not from the possibly older detection quote.
    pub fn compose(
        &self,
        opp: &Opportunity,
        rev: &Revalidation,
        authority: &Pubkey,
        recent_blockhash: Hash,
        last_valid_block_height: u64,
    ) -> Result<TransactionPlan, EngineError> {
        let legs: Vec<SwapLeg> = rev
            .hops
            .iter()
            .map(|hop| SwapLeg {
                dex_type: hop.venue.wire_tag(),
                amount_in: hop.amount_in,
                minimum_amount_out: min_out(hop.amount_out, self.slippage_bps),
                mint_in: hop.token_in.to_bytes(),
                mint_out: hop.token_out.to_bytes(),
            })
            .collect();

        let payload = SwapData {
            expected_profit: rev.expected_profit,
            slippage_bps: self.slippage_bps,
            swap_instructions: legs,
        };
        let mut data = vec![EXECUTE_SWAP_DISCRIMINATOR];
        data.extend(
            payload
                .try_to_vec()
                .map_err(|e| EngineError::RejectedLocally(format!("encode swap data: {e}")))?,
        );

        let units = (BASE_TX_UNITS + UNITS_PER_HOP * rev.hops.len() as u32)
            .min(self.compute_unit_limit);
        let mut instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(units),
            ComputeBudgetInstruction::set_compute_unit_price(
                self.compute_unit_price_micro_lamports,
            ),
        ];
        instructions.push(Instruction {
            program_id: self.program_id,
            accounts: self.account_metas(&rev.hops, authority),
            data,
        });

        debug!(
            opportunity = %opp.id,
            hops = opp.hops.len(),
            expected_profit = rev.expected_profit,
            last_valid_block_height,
            "composed transaction plan"
        );
        Ok(TransactionPlan {
            id: opp.id,
            instructions,
            payer: *authority,
            recent_blockhash,
            last_valid_block_height,
            amount_in: opp.amount_in,
            expected_profit: rev.expected_profit,
            start_token: opp.start_token,
            hop_count: opp.hops.len(),
        })
    }

    /// Account list the swap-agent expects: authority and its state PDA,
    /// then per hop the pool, the venue program, and the authority's token
    /// accounts for both sides.
    fn account_metas(&self, hops: &[PlannedHop], authority: &Pubkey) -> Vec<AccountMeta> {
        let mut metas = vec![
            AccountMeta::new(*authority, true),
            AccountMeta::new(self.agent_address(authority), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ];
        for hop in hops {
            metas.push(AccountMeta::new(hop.pool, false));
            metas.push(AccountMeta::new_readonly(hop.venue.program(), false));
            metas.push(AccountMeta::new(
                get_associated_token_address(authority, &hop.token_in),
                false,
            ));
            metas.push(AccountMeta::new(
                get_associated_token_address(authority, &hop.token_out),
                false,
            ));
        }
        metas
    }
}

/// Worst acceptable output for an expected amount, floor rounding. The
/// shortfall tolerance is the slippage allowance, never more.
fn min_out(expected: u64, slippage_bps: u16) -> u64 {
    (expected as u128 * (BPS_DENOMINATOR as u128 - slippage_bps as u128)
        / BPS_DENOMINATOR as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pathfinder::PlannedHop;
    use crate::shared::types::{Direction, Venue};

    fn sample_opportunity() -> Opportunity {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        Opportunity {
            id: Uuid::new_v4(),
            start_token: a,
            hops: vec![
                PlannedHop {
                    pool: Pubkey::new_unique(),
                    venue: Venue::Raydium,
                    dir: Direction::AtoB,
                    token_in: a,
                    token_out: b,
                    fee_bps: 25,
                    amount_in: 10_000_000,
                    amount_out: 10_400_000,
                },
                PlannedHop {
                    pool: Pubkey::new_unique(),
                    venue: Venue::Phoenix,
                    dir: Direction::BtoA,
                    token_in: b,
                    token_out: a,
                    fee_bps: 5,
                    amount_in: 10_400_000,
                    amount_out: 10_150_000,
                },
            ],
            amount_in: 10_000_000,
            expected_out: 10_150_000,
            expected_profit: 150_000,
            graph_version: 7,
        }
    }

    /// Re-quoted amounts that have drifted from the detection quote but
    /// remain profitable.
    fn revalidation(opp: &Opportunity) -> Revalidation {
        let mut hops = opp.hops.clone();
        hops[0].amount_out -= 10_000;
        hops[1].amount_in = hops[0].amount_out;
        hops[1].amount_out -= 15_000;
        let expected_out = hops[1].amount_out;
        Revalidation {
            hops,
            expected_out,
            expected_profit: expected_out - opp.amount_in,
            graph_version: 8,
        }
    }

    fn composer() -> Composer {
        Composer::new(Pubkey::new_unique(), 50, 400_000, 1_000)
    }

    #[test]
    fn min_out_floors_against_us() {
        assert_eq!(min_out(10_000, 50), 9_950);
        // 9999 * 0.995 = 9949.005, floor
        assert_eq!(min_out(9_999, 50), 9_949);
        assert_eq!(min_out(10_000, 0), 10_000);
    }

    #[test]
    fn plan_opens_with_compute_budget() {
        let composer = composer();
        let opp = sample_opportunity();
        let plan = composer
            .compose(
                &opp,
                &revalidation(&opp),
                &Pubkey::new_unique(),
                Hash::new_unique(),
                12_345,
            )
            .unwrap();

        assert_eq!(plan.instructions.len(), 3);
        assert_eq!(
            plan.instructions[0].program_id,
            solana_sdk::compute_budget::id()
        );
        assert_eq!(
            plan.instructions[1].program_id,
            solana_sdk::compute_budget::id()
        );
        assert_eq!(plan.last_valid_block_height, 12_345);
    }

    #[test]
    fn swap_data_round_trips_with_discriminator() {
        let composer = composer();
        let opp = sample_opportunity();
        let rev = revalidation(&opp);
        let plan = composer
            .compose(&opp, &rev, &Pubkey::new_unique(), Hash::new_unique(), 1)
            .unwrap();

        let data = &plan.instructions[2].data;
        assert_eq!(data[0], EXECUTE_SWAP_DISCRIMINATOR);
        let decoded = SwapData::try_from_slice(&data[1..]).unwrap();
        assert_eq!(decoded.expected_profit, rev.expected_profit);
        assert_eq!(decoded.slippage_bps, 50);
        assert_eq!(decoded.swap_instructions.len(), 2);
        assert_eq!(decoded.swap_instructions[0].dex_type, Venue::Raydium.wire_tag());
        assert_eq!(
            decoded.swap_instructions[1].mint_out,
            opp.start_token.to_bytes()
        );
    }

    #[test]
    fn guards_price_off_revalidated_amounts() {
        let composer = composer();
        let opp = sample_opportunity();
        let rev = revalidation(&opp);
        // The re-quote really did move away from the detection figures.
        assert_ne!(rev.hops[0].amount_out, opp.hops[0].amount_out);

        let plan = composer
            .compose(&opp, &rev, &Pubkey::new_unique(), Hash::new_unique(), 1)
            .unwrap();
        let decoded = SwapData::try_from_slice(&plan.instructions[2].data[1..]).unwrap();

        for (leg, hop) in decoded.swap_instructions.iter().zip(&rev.hops) {
            assert_eq!(leg.amount_in, hop.amount_in);
            assert_eq!(leg.minimum_amount_out, min_out(hop.amount_out, 50));
        }
        assert_eq!(plan.expected_profit, rev.expected_profit);
    }

    #[test]
    fn agent_pda_is_deterministic() {
        let composer = composer();
        let authority = Pubkey::new_unique();
        assert_eq!(
            composer.agent_address(&authority),
            composer.agent_address(&authority)
        );
        assert_ne!(
            composer.agent_address(&authority),
            composer.agent_address(&Pubkey::new_unique())
        );
    }

    #[test]
    fn signing_produces_a_valid_transaction() {
        let composer = composer();
        let keypair = Keypair::new();
        let opp = sample_opportunity();
        let plan = composer
            .compose(
                &opp,
                &revalidation(&opp),
                &keypair.pubkey(),
                Hash::new_unique(),
                1,
            )
            .unwrap();
        let tx = plan.into_signed_transaction(&keypair);
        assert_eq!(tx.signatures.len(), 1);
        tx.verify().unwrap();
    }
}
