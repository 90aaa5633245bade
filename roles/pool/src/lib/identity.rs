//! ## Login identity
//!
//! Miners log in with a single composite string, for instance `ADDRESS~rig1+PAYMENTID.50000`:
//! the payout address first, then any of worker id, payment id and fixed difficulty, each
//! introduced by its configured separator.
//!
//! [`parse_login`] decomposes that string in one left-to-right pass. [`Identity::resolve`] then
//! validates the parts and builds the miner id used as registry key.

use crate::{address::AddressValidator, config::LoginSeparators, error::StratumError};

/// Field the accumulator is currently collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Address,
    WorkerId,
    PaymentId,
    FixedDiff,
}

/// The four components of a composite login string. Absent parts are empty / zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginParts {
    pub address: String,
    pub worker_id: String,
    pub payment_id: String,
    pub fixed_diff: u64,
}

struct LoginParser {
    separators: LoginSeparators,
    field: Field,
    acc: String,
    parts: LoginParts,
}

impl LoginParser {
    fn new(separators: LoginSeparators) -> Self {
        Self {
            separators,
            field: Field::Address,
            acc: String::new(),
            parts: LoginParts::default(),
        }
    }

    fn separator_field(&self, c: char) -> Option<Field> {
        if c == self.separators.worker_id {
            Some(Field::WorkerId)
        } else if c == self.separators.payment_id {
            Some(Field::PaymentId)
        } else if c == self.separators.fixed_diff {
            Some(Field::FixedDiff)
        } else {
            None
        }
    }

    fn step(&mut self, c: char, is_last: bool) {
        let separator = self.separator_field(c);
        if separator.is_none() && !is_last {
            self.acc.push(c);
            return;
        }
        // The last character always belongs to the field being collected, even when it is a
        // separator itself.
        if is_last {
            self.acc.push(c);
        }
        self.finalize();
        if let Some(next) = separator {
            self.field = next;
        }
    }

    fn finalize(&mut self) {
        let value = std::mem::take(&mut self.acc);
        match self.field {
            Field::Address => self.parts.address = value,
            Field::WorkerId => self.parts.worker_id = value,
            Field::PaymentId => self.parts.payment_id = value,
            // An unparsable difficulty silently means "no fixed difficulty".
            Field::FixedDiff => self.parts.fixed_diff = value.parse().unwrap_or(0),
        }
    }
}

/// Splits a composite login string into its parts.
///
/// This is a single pass, not a general splitter: fields are expected in protocol order
/// (address first) and a repeated separator overwrites the field it introduces.
pub fn parse_login(raw: &str, separators: LoginSeparators) -> LoginParts {
    let mut parser = LoginParser::new(separators);
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        let is_last = chars.peek().is_none();
        parser.step(c, is_last);
    }
    parser.parts
}

/// Payment ids are hex and either 16 (short) or 64 (long) characters.
pub fn is_valid_payment_id(payment_id: &str) -> bool {
    matches!(payment_id.len(), 16 | 64) && hex::decode(payment_id).is_ok()
}

/// A validated login, keyed by the miner id it resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub address: String,
    pub worker_id: String,
    pub payment_id: String,
    pub fixed_diff: u64,
}

impl Identity {
    /// Validates the parts of a login and builds the miner id.
    ///
    /// The id is `address`, then `+payment_id` when present, then `<worker separator>worker_id`
    /// when a worker id is present and differs from the address. Payment id format is checked
    /// before the address.
    pub fn resolve(
        parts: LoginParts,
        separators: LoginSeparators,
        validator: &dyn AddressValidator,
    ) -> Result<Self, StratumError> {
        if !parts.payment_id.is_empty() && !is_valid_payment_id(&parts.payment_id) {
            return Err(StratumError::InvalidPaymentId);
        }

        let mut id = parts.address.clone();
        if !parts.payment_id.is_empty() {
            id.push('+');
            id.push_str(&parts.payment_id);
        }
        if !parts.worker_id.is_empty() && parts.worker_id != parts.address {
            id.push(separators.worker_id);
            id.push_str(&parts.worker_id);
        }

        if !validator.validate_address(&parts.address) {
            return Err(StratumError::InvalidAddress);
        }

        Ok(Self {
            id,
            address: parts.address,
            worker_id: parts.worker_id,
            payment_id: parts.payment_id,
            fixed_diff: parts.fixed_diff,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;

    struct AnyAddress;

    impl AddressValidator for AnyAddress {
        fn validate_address(&self, address: &str) -> bool {
            !address.is_empty()
        }
    }

    fn separators() -> LoginSeparators {
        LoginSeparators::new('~', '+', '.').unwrap()
    }

    fn resolve(raw: &str) -> Result<Identity, StratumError> {
        Identity::resolve(parse_login(raw, separators()), separators(), &AnyAddress)
    }

    fn is_separator(c: char) -> bool {
        c == '~' || c == '+' || c == '.'
    }

    const LONG_PID: &str = "aabbccddeeff00112233445566778899aabbccddeeff00112233445566778899";

    #[test]
    fn address_only() {
        let parts = parse_login("Addr1", separators());
        assert_eq!(
            parts,
            LoginParts {
                address: "Addr1".into(),
                ..Default::default()
            }
        );
        assert_eq!(resolve("Addr1").unwrap().id, "Addr1");
    }

    #[test]
    fn address_and_worker() {
        let identity = resolve("Addr1~worker1").unwrap();
        assert_eq!(identity.id, "Addr1~worker1");
        assert_eq!(identity.worker_id, "worker1");
        assert_eq!(identity.address, "Addr1");
    }

    #[test]
    fn all_fields() {
        let raw = format!("Addr1~rig+{LONG_PID}.25000");
        let parts = parse_login(&raw, separators());
        assert_eq!(parts.address, "Addr1");
        assert_eq!(parts.worker_id, "rig");
        assert_eq!(parts.payment_id, LONG_PID);
        assert_eq!(parts.fixed_diff, 25000);
        assert_eq!(
            resolve(&raw).unwrap().id,
            format!("Addr1+{LONG_PID}~rig")
        );
    }

    #[test]
    fn long_payment_id_is_accepted() {
        let identity = resolve(&format!("Addr1+{LONG_PID}")).unwrap();
        assert_eq!(identity.id, format!("Addr1+{LONG_PID}"));
    }

    #[test]
    fn short_payment_id_is_accepted() {
        assert_eq!(
            resolve("Addr1+0123456789abcdef").unwrap().id,
            "Addr1+0123456789abcdef"
        );
    }

    #[test]
    fn payment_id_of_32_hex_is_rejected() {
        assert_eq!(
            resolve("Addr1+deadbeefdeadbeefdeadbeefdeadbeef"),
            Err(StratumError::InvalidPaymentId)
        );
    }

    #[test]
    fn non_hex_payment_id_is_rejected() {
        assert_eq!(
            resolve("Addr1+zzzzzzzzzzzzzzzz"),
            Err(StratumError::InvalidPaymentId)
        );
    }

    #[test]
    fn payment_id_is_checked_before_address() {
        assert_eq!(
            resolve("+deadbeef"),
            Err(StratumError::InvalidPaymentId)
        );
        assert_eq!(resolve(""), Err(StratumError::InvalidAddress));
    }

    #[test]
    fn worker_equal_to_address_is_not_appended() {
        assert_eq!(resolve("Addr1~Addr1").unwrap().id, "Addr1");
    }

    #[test]
    fn unparsable_fixed_diff_is_zero() {
        assert_eq!(parse_login("Addr1.lots", separators()).fixed_diff, 0);
        assert_eq!(parse_login("Addr1.-5", separators()).fixed_diff, 0);
        assert_eq!(parse_login("Addr1.99999999999999999999999", separators()).fixed_diff, 0);
    }

    #[test]
    fn trailing_separator_is_kept_in_last_field() {
        let parts = parse_login("Addr1~", separators());
        assert_eq!(parts.address, "Addr1~");
        assert_eq!(parts.worker_id, "");
    }

    #[test]
    fn single_character_login() {
        assert_eq!(parse_login("A", separators()).address, "A");
        assert_eq!(parse_login("~", separators()).address, "~");
    }

    #[test]
    fn empty_login_yields_empty_parts() {
        assert_eq!(parse_login("", separators()), LoginParts::default());
    }

    #[test]
    fn multibyte_last_character_is_not_dropped() {
        let parts = parse_login("Addr1~rigé", separators());
        assert_eq!(parts.worker_id, "rigé");
    }

    #[test]
    fn multibyte_separators() {
        let separators = LoginSeparators::new('§', '¤', 'µ').unwrap();
        let parts = parse_login("Addr§rig¤0123456789abcdefµ77", separators);
        assert_eq!(parts.address, "Addr");
        assert_eq!(parts.worker_id, "rig");
        assert_eq!(parts.payment_id, "0123456789abcdef");
        assert_eq!(parts.fixed_diff, 77);
    }

    #[quickcheck_macros::quickcheck]
    fn address_without_separators_is_its_own_identity(address: String) -> TestResult {
        if address.is_empty() || address.chars().any(is_separator) {
            return TestResult::discard();
        }
        let parts = parse_login(&address, separators());
        let ok = parts.worker_id.is_empty()
            && parts.payment_id.is_empty()
            && parts.fixed_diff == 0
            && resolve(&address).map(|i| i.id) == Ok(address.clone());
        TestResult::from_bool(ok)
    }

    #[quickcheck_macros::quickcheck]
    fn address_and_worker_round_trip(address: String, worker: String) -> TestResult {
        if address.is_empty()
            || worker.is_empty()
            || address == worker
            || address.chars().chain(worker.chars()).any(is_separator)
        {
            return TestResult::discard();
        }
        let identity = match resolve(&format!("{address}~{worker}")) {
            Ok(identity) => identity,
            Err(_) => return TestResult::failed(),
        };
        TestResult::from_bool(
            identity.address == address
                && identity.worker_id == worker
                && identity.id == format!("{address}~{worker}"),
        )
    }

    #[quickcheck_macros::quickcheck]
    fn parsing_is_deterministic(raw: String) -> bool {
        parse_login(&raw, separators()) == parse_login(&raw, separators())
    }

    #[quickcheck_macros::quickcheck]
    fn bad_payment_id_length_is_always_rejected(worker: String, len: u8) -> TestResult {
        let len = len as usize;
        if len == 0 || len == 16 || len == 64 || worker.chars().any(is_separator) {
            return TestResult::discard();
        }
        let raw = format!("Addr1~{worker}+{}", "a".repeat(len));
        TestResult::from_bool(resolve(&raw) == Err(StratumError::InvalidPaymentId))
    }
}
