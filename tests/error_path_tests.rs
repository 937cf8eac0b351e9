//! Rejections raised while processing blocks, and their effect on chain state

mod common;

use common::*;
use consensus_engine::params::Checkpoint;
use consensus_engine::*;
use std::sync::Arc;

fn assert_rejected(chain: &mut TestChain, block: Block, kind: ErrorKind) {
    let height = chain.height();
    let stored = chain.store.len();
    let err = chain.process(block.clone()).unwrap_err();
    assert_eq!(err.rule_kind(), Some(kind), "unexpected error: {}", err);
    assert_eq!(chain.height(), height);
    assert_eq!(chain.store.len(), stored);
    // a rejected block is not indexed
    assert_eq!(
        chain.chain.process_block(&block, BehaviorFlags::NONE).unwrap_err().rule_kind(),
        Some(kind)
    );
}

#[test]
fn test_coinbase_pays_more_than_subsidy() {
    let mut chain = TestChain::regtest();
    let mut next = chain.next();
    next.coinbase_value = BASE_SUBSIDY + 1;
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::BadCoinbaseValue);
}

#[test]
fn test_coinbase_may_claim_fees() {
    let mut chain = TestChain::regtest();
    chain.mine(100);
    let fee = 5_000;

    let mut next = chain.next();
    next.transactions.push(spend(chain.coinbase_outpoint(1), BASE_SUBSIDY - fee));
    next.coinbase_value = BASE_SUBSIDY + fee + 1;
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::BadCoinbaseValue);

    next.coinbase_value = BASE_SUBSIDY + fee;
    assert_eq!(chain.process(next.build(chain.params())).unwrap(), BlockStatus::MainChain);
}

#[test]
fn test_immature_coinbase_spend() {
    let mut chain = TestChain::regtest();
    chain.mine(99);

    // height 100 is one block short of maturity for the height 1 coinbase
    let mut next = chain.next();
    next.transactions.push(spend(chain.coinbase_outpoint(1), BASE_SUBSIDY));
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::ImmatureSpend);
}

#[test]
fn test_missing_and_double_spent_inputs() {
    let mut chain = TestChain::regtest();
    chain.mine(100);

    let mut next = chain.next();
    next.transactions.push(spend(OutPoint::new(Hash([7; 32]), 0), 1));
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::MissingTxOut);

    let funding = chain.coinbase_outpoint(1);
    let mut next = chain.next();
    next.transactions = vec![spend(funding, 1_000), spend(funding, 2_000)];
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::MissingTxOut);
}

#[test]
fn test_spend_exceeds_inputs() {
    let mut chain = TestChain::regtest();
    chain.mine(100);
    let mut next = chain.next();
    next.transactions.push(spend(chain.coinbase_outpoint(1), BASE_SUBSIDY + 1));
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::SpendTooHigh);
}

#[test]
fn test_unfinalized_coinbase_by_height() {
    let mut chain = TestChain::regtest();
    chain.mine(4);

    let mut next = chain.next();
    next.coinbase_sequence = 0;
    next.coinbase_lock_time = 5;
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::UnfinalizedTx);

    next.coinbase_lock_time = 4;
    assert_eq!(chain.process(next.build(chain.params())).unwrap(), BlockStatus::MainChain);
}

#[test]
fn test_unfinalized_coinbase_by_time() {
    let mut chain = TestChain::regtest();
    let mut next = chain.next();
    next.coinbase_sequence = 0;
    next.coinbase_lock_time = next.timestamp;
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::UnfinalizedTx);

    // a final sequence overrides the lock time
    next.coinbase_sequence = SEQUENCE_FINAL;
    assert_eq!(chain.process(next.build(chain.params())).unwrap(), BlockStatus::MainChain);
}

#[test]
fn test_fast_add_skips_finality() {
    let mut chain = TestChain::regtest();
    let mut next = chain.next();
    next.coinbase_sequence = 0;
    next.coinbase_lock_time = 1;
    let block = next.build(chain.params());
    assert_eq!(
        chain.chain.process_block(&block, BehaviorFlags::fast_add()).unwrap(),
        BlockStatus::MainChain
    );
}

#[test]
fn test_wrong_difficulty() {
    let mut chain = TestChain::regtest();
    let mut next = chain.next();
    next.bits = 0x1f7fffff;
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::UnexpectedDifficulty);
}

#[test]
fn test_timestamp_not_after_median() {
    let mut chain = TestChain::regtest();
    chain.mine(3);
    let mut next = chain.next();
    // median of genesis and three blocks 60s apart is the block at height 2
    next.timestamp = chain.blocks[2].header.timestamp;
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::TimeTooOld);

    // before the first hard fork only the median matters
    next.timestamp = chain.blocks[2].header.timestamp + 1;
    assert_eq!(chain.process(next.build(chain.params())).unwrap(), BlockStatus::MainChain);
}

#[test]
fn test_timestamp_too_far_in_future() {
    let mut chain = TestChain::regtest();
    let mut next = chain.next();
    next.timestamp = test_time(chain.params()).0 as u32 + MAX_TIME_OFFSET_SECONDS as u32 + 1;
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::TimeTooNew);
}

#[test]
fn test_high_hash() {
    let mut chain = TestChain::regtest();
    let block = chain.next().build_unsolved(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::HighHash);
}

#[test]
fn test_bad_merkle_root() {
    let mut chain = TestChain::regtest();
    let mut block = chain.next().build(chain.params());
    let mut other = chain.next();
    other.coinbase_tag = 9;
    // the header stays solved; only its commitment no longer matches
    block.transactions = vec![other.coinbase()];
    assert_rejected(&mut chain, block, ErrorKind::BadMerkleRoot);
}

#[test]
fn test_missing_parent() {
    let mut chain = TestChain::regtest();
    let mut next = chain.next();
    next.prev.nonce += 1;
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::MissingParent);
}

#[test]
fn test_duplicate_block() {
    let mut chain = TestChain::regtest();
    chain.mine(1);
    let err = chain
        .chain
        .process_block(&chain.blocks[1], BehaviorFlags::NONE)
        .unwrap_err();
    assert_eq!(err.rule_kind(), Some(ErrorKind::DuplicateBlock));

    let err = chain
        .chain
        .process_block(&chain.blocks[0], BehaviorFlags::NONE)
        .unwrap_err();
    assert_eq!(err.rule_kind(), Some(ErrorKind::DuplicateBlock));
}

#[test]
fn test_p2sh_sig_op_cost_exceeds_limit() {
    let mut chain = TestChain::regtest();
    chain.mine(100);

    let fund = spend_with_scripts(chain.coinbase_outpoint(1), BASE_SUBSIDY, vec![0x51], p2sh_script([0x11; 20]));
    let mut next = chain.next();
    next.transactions.push(fund.clone());
    chain.process(next.build(chain.params())).unwrap();

    // 1001 bare CHECKMULTISIGs count 20 each: 20_020 sig ops, cost 80_080
    let script_sig = push_redeem_script(&[0xae; 1001]);
    let redeem = spend_with_scripts(OutPoint::new(fund.txid(), 0), BASE_SUBSIDY, script_sig, vec![0x51]);

    let mut next = chain.next();
    next.timestamp = BIP16_ACTIVATION_TIME;
    next.transactions.push(redeem.clone());
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::TooManySigOps);

    // before BIP16 the redeem script is not counted
    let mut next = chain.next();
    next.transactions.push(redeem);
    assert_eq!(chain.process(next.build(chain.params())).unwrap(), BlockStatus::MainChain);
}

#[test]
fn test_p2sh_sig_op_cost_counts_outputs_created_in_block() {
    let mut chain = TestChain::regtest();
    chain.mine(100);

    let fund = spend_with_scripts(chain.coinbase_outpoint(1), BASE_SUBSIDY, vec![0x51], p2sh_script([0x22; 20]));
    let script_sig = push_redeem_script(&[0xae; 1001]);
    let redeem = spend_with_scripts(OutPoint::new(fund.txid(), 0), BASE_SUBSIDY, script_sig, vec![0x51]);

    let mut next = chain.next();
    next.timestamp = BIP16_ACTIVATION_TIME;
    next.transactions = vec![fund.clone(), redeem];
    let block = next.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::TooManySigOps);

    // 1000 of them stay exactly at the limit
    let script_sig = push_redeem_script(&[0xae; 1000]);
    let redeem = spend_with_scripts(OutPoint::new(fund.txid(), 0), BASE_SUBSIDY, script_sig, vec![0x51]);
    next.transactions = vec![fund, redeem];
    assert_eq!(chain.process(next.build(chain.params())).unwrap(), BlockStatus::MainChain);
}

#[test]
fn test_script_failure() {
    let mut chain = TestChain::with_params(ChainParams::regtest(), Arc::new(RejectAll));
    let block = chain.next().build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::ScriptValidation);
}

/// Builds the first `count` regtest blocks without a chain
fn regtest_blocks(count: Height) -> Vec<Block> {
    let params = ChainParams::regtest();
    let mut blocks = vec![params.genesis_block.clone()];
    for height in 1..=count {
        let prev = blocks.last().map(|b| b.header.clone()).unwrap();
        blocks.push(BlockTemplate::new(&params, &prev, height).build(&params));
    }
    blocks
}

#[test]
fn test_checkpoint_mismatch() {
    let blocks = regtest_blocks(2);
    let mut params = ChainParams::regtest();
    params.checkpoints = vec![Checkpoint {
        height: 2,
        hash: Hash([9; 32]),
    }];
    let mut chain = TestChain::with_params(params, Arc::new(AcceptAll));
    chain.process(blocks[1].clone()).unwrap();
    assert_rejected(&mut chain, blocks[2].clone(), ErrorKind::BadCheckpoint);
}

#[test]
fn test_checkpoints_skip_scripts_and_block_old_forks() {
    let blocks = regtest_blocks(3);
    let mut params = ChainParams::regtest();
    params.checkpoints = vec![Checkpoint {
        height: 2,
        hash: blocks[2].block_hash(),
    }];
    let mut chain = TestChain::with_params(params, Arc::new(RejectAll));

    // scripts are not run at or below the latest checkpoint
    chain.process(blocks[1].clone()).unwrap();
    chain.process(blocks[2].clone()).unwrap();
    assert_rejected(&mut chain, blocks[3].clone(), ErrorKind::ScriptValidation);

    // a fork below the passed checkpoint
    let mut fork = BlockTemplate::new(chain.params(), &blocks[0].header, 1);
    fork.coinbase_tag = 1;
    let block = fork.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::ForkTooOld);

    // a fork at the checkpoint height is still checked against it
    let mut fork = BlockTemplate::new(chain.params(), &blocks[1].header, 2);
    fork.coinbase_tag = 1;
    let block = fork.build(chain.params());
    assert_rejected(&mut chain, block, ErrorKind::BadCheckpoint);
}

#[test]
fn test_no_checkpoints_config() {
    let blocks = regtest_blocks(2);
    let config = ChainConfig {
        network: "regtest".to_string(),
        no_checkpoints: true,
        extra_checkpoints: vec![Checkpoint {
            height: 2,
            hash: Hash([9; 32]),
        }],
        plan9_height: None,
    };
    let params = config.chain_params().unwrap();
    let mut chain = TestChain::with_params(params, Arc::new(AcceptAll));
    chain.process(blocks[1].clone()).unwrap();
    chain.process(blocks[2].clone()).unwrap();
    assert_eq!(chain.height(), 2);
}
