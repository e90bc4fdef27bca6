use crate::{
    Error,
    Result,
    chest_types::{
        WithdrawAllCall,
        WithdrawCall,
    },
    codec::{
        CallPayload,
        EventCodec,
    },
};
use ethers::{
    abi::AbiEncode,
    types::{
        Address,
        U256,
    },
};

/// Decides whether `caller` may issue administrative calls.
pub trait Authorize {
    fn is_authorized(&self, caller: Address) -> bool;
}

impl<F> Authorize for F
where
    F: Fn(Address) -> bool,
{
    fn is_authorized(&self, caller: Address) -> bool {
        self(caller)
    }
}

/// Grants access to a single known owner.
#[derive(Clone, Copy, Debug)]
pub struct Owner(pub Address);

impl Authorize for Owner {
    fn is_authorized(&self, caller: Address) -> bool {
        self.0 == caller
    }
}

/// `withdraw(amount)` when an amount is given, `withdrawAll()` otherwise.
pub fn encode_withdraw(
    codec: &EventCodec,
    authorize: &impl Authorize,
    caller: Address,
    amount: Option<U256>,
) -> Result<CallPayload> {
    if !authorize.is_authorized(caller) {
        tracing::warn!(?caller, "rejected withdrawal from unauthorized caller");
        return Err(Error::Unauthorized(caller));
    }
    let data = match amount {
        Some(amount) => WithdrawCall { amount }.encode(),
        None => WithdrawAllCall::default().encode(),
    };
    Ok(codec.call(data))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::*;
    use ethers::{
        abi::AbiDecode,
        utils::parse_ether,
    };

    #[test]
    fn encode_withdraw__owner_with_amount__encodes_withdraw() {
        // given
        let owner = Owner(player_address());
        let amount = parse_ether("0.5").unwrap();

        // when
        let call = encode_withdraw(&test_codec(), &owner, player_address(), Some(amount)).unwrap();

        // then
        assert_eq!(call.to, contract_address());
        assert_eq!(call.value, None);
        assert_eq!(WithdrawCall::decode(&call.data).unwrap().amount, amount);
    }

    #[test]
    fn encode_withdraw__no_amount__withdraws_everything() {
        let allow_all = |_: Address| true;

        let call = encode_withdraw(&test_codec(), &allow_all, player_address(), None).unwrap();

        assert_eq!(call.data.to_vec(), WithdrawAllCall::default().encode());
    }

    #[test]
    fn encode_withdraw__stranger__is_unauthorized() {
        // given
        let owner = Owner(Address::repeat_byte(0x01));

        // when
        let result = encode_withdraw(&test_codec(), &owner, player_address(), None);

        // then
        assert_eq!(result, Err(Error::Unauthorized(player_address())));
    }
}
