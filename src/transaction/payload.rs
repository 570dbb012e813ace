//! Unsigned transfer construction

use alloy::consensus::TxEip1559;
use alloy::primitives::{Address, Bytes, TxKind, U256};

use crate::chain::FeeParameters;
use crate::tokens::{TokenInfo, TokenKind};

/// ERC20 transfer(address,uint256) selector
const TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// ABI-encode `transfer(to, amount)`
pub fn erc20_transfer_calldata(to: Address, amount: U256) -> Bytes {
    let mut calldata = Vec::with_capacity(4 + 32 + 32);
    calldata.extend_from_slice(&TRANSFER_SELECTOR);
    calldata.extend_from_slice(&[0u8; 12]);
    calldata.extend_from_slice(to.as_slice());
    calldata.extend_from_slice(&amount.to_be_bytes::<32>());
    Bytes::from(calldata)
}

/// Build an EIP-1559 transfer of `amount` raw units of `token` to `to`
pub fn build_transfer(
    chain_id: u64,
    nonce: u64,
    fees: FeeParameters,
    token: &TokenInfo,
    to: Address,
    amount: U256,
) -> TxEip1559 {
    let (target, value, input) = match token.kind {
        TokenKind::Native => (to, amount, Bytes::new()),
        TokenKind::Erc20 { contract } => {
            (contract, U256::ZERO, erc20_transfer_calldata(to, amount))
        }
    };

    TxEip1559 {
        chain_id,
        nonce,
        gas_limit: token.transfer_gas_limit(),
        max_fee_per_gas: fees.max_fee_per_gas,
        max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
        to: TxKind::Call(target),
        value,
        input,
        ..Default::default()
    }
}
