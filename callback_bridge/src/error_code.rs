//! The native library's numeric status codes.
//!
//! `0` means success, everything else names a failure cause. The bridge does
//! not own this enumeration, it only mirrors it so that failures can be
//! reported with a name, a description and a coarse category. Codes the
//! table does not know map to [`ErrorCode::UnknownNativeError`].

use std::fmt::Display;

use serde::{Deserialize, Serialize};

// -------------------------------------------------------------------------------------------------------

/// Coarse grouping of native status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Success,
    InvalidParameter,
    InvalidState,
    Io,
    NotFound,
    AlreadyExists,
    ConsensusOrTimeout,
    Crypto,
    WalletStorage,
    Payment,
    Unknown,
}

macro_rules! native_error_codes {
    ($( $name:ident = $value:literal, $category:ident, $text:literal; )*) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(i32)]
        pub enum ErrorCode {
            $( $name = $value, )*
            /// Any code that is not part of the table above.
            UnknownNativeError = -1,
        }

        impl ErrorCode {
            /// Map a raw native status to its table entry. Never fails.
            pub fn lookup(raw: i32) -> ErrorCode {
                match raw {
                    $( $value => ErrorCode::$name, )*
                    _ => ErrorCode::UnknownNativeError,
                }
            }

            pub fn description(self) -> &'static str {
                match self {
                    $( ErrorCode::$name => $text, )*
                    ErrorCode::UnknownNativeError => "Unrecognized native error code",
                }
            }

            pub fn category(self) -> ErrorCategory {
                match self {
                    $( ErrorCode::$name => ErrorCategory::$category, )*
                    ErrorCode::UnknownNativeError => ErrorCategory::Unknown,
                }
            }
        }
    };
}

native_error_codes! {
    Success = 0, Success, "Success";

    CommonInvalidParam1 = 100, InvalidParameter, "Invalid value for parameter 1";
    CommonInvalidParam2 = 101, InvalidParameter, "Invalid value for parameter 2";
    CommonInvalidParam3 = 102, InvalidParameter, "Invalid value for parameter 3";
    CommonInvalidParam4 = 103, InvalidParameter, "Invalid value for parameter 4";
    CommonInvalidParam5 = 104, InvalidParameter, "Invalid value for parameter 5";
    CommonInvalidParam6 = 105, InvalidParameter, "Invalid value for parameter 6";
    CommonInvalidParam7 = 106, InvalidParameter, "Invalid value for parameter 7";
    CommonInvalidParam8 = 107, InvalidParameter, "Invalid value for parameter 8";
    CommonInvalidParam9 = 108, InvalidParameter, "Invalid value for parameter 9";
    CommonInvalidParam10 = 109, InvalidParameter, "Invalid value for parameter 10";
    CommonInvalidParam11 = 110, InvalidParameter, "Invalid value for parameter 11";
    CommonInvalidParam12 = 111, InvalidParameter, "Invalid value for parameter 12";
    CommonInvalidState = 112, InvalidState, "Invalid library state";
    CommonInvalidStructure = 113, InvalidParameter, "Object passed by the caller has an invalid structure";
    CommonIOError = 114, Io, "IO error";
    CommonInvalidParam13 = 115, InvalidParameter, "Invalid value for parameter 13";
    CommonInvalidParam14 = 116, InvalidParameter, "Invalid value for parameter 14";
    CommonInvalidParam15 = 117, InvalidParameter, "Invalid value for parameter 15";
    CommonInvalidParam16 = 118, InvalidParameter, "Invalid value for parameter 16";
    CommonInvalidParam17 = 119, InvalidParameter, "Invalid value for parameter 17";
    CommonInvalidParam18 = 120, InvalidParameter, "Invalid value for parameter 18";
    CommonInvalidParam19 = 121, InvalidParameter, "Invalid value for parameter 19";
    CommonInvalidParam20 = 122, InvalidParameter, "Invalid value for parameter 20";
    CommonInvalidParam21 = 123, InvalidParameter, "Invalid value for parameter 21";
    CommonInvalidParam22 = 124, InvalidParameter, "Invalid value for parameter 22";
    CommonInvalidParam23 = 125, InvalidParameter, "Invalid value for parameter 23";
    CommonInvalidParam24 = 126, InvalidParameter, "Invalid value for parameter 24";
    CommonInvalidParam25 = 127, InvalidParameter, "Invalid value for parameter 25";
    CommonInvalidParam26 = 128, InvalidParameter, "Invalid value for parameter 26";
    CommonInvalidParam27 = 129, InvalidParameter, "Invalid value for parameter 27";

    WalletInvalidHandle = 200, InvalidParameter, "Invalid wallet handle";
    WalletUnknownTypeError = 201, WalletStorage, "Unknown wallet storage type";
    WalletTypeAlreadyRegisteredError = 202, AlreadyExists, "Wallet storage type already registered";
    WalletAlreadyExistsError = 203, AlreadyExists, "Wallet with this name already exists";
    WalletNotFoundError = 204, NotFound, "Wallet not found";
    WalletIncompatiblePoolError = 205, InvalidState, "Wallet is bound to a different pool";
    WalletAlreadyOpenedError = 206, InvalidState, "Wallet already opened";
    WalletAccessFailed = 207, WalletStorage, "Wallet access failed, invalid credentials";
    WalletInputError = 208, WalletStorage, "Invalid input to wallet operation";
    WalletDecodingError = 209, WalletStorage, "Wallet data could not be decoded";
    WalletStorageError = 210, WalletStorage, "Wallet storage failure";
    WalletEncryptionError = 211, Crypto, "Wallet encryption failure";
    WalletItemNotFound = 212, NotFound, "Wallet item not found";
    WalletItemAlreadyExists = 213, AlreadyExists, "Wallet item already exists";
    WalletQueryError = 214, WalletStorage, "Invalid wallet query";

    PoolLedgerNotCreatedError = 300, NotFound, "Pool ledger config not created";
    PoolLedgerInvalidPoolHandle = 301, InvalidParameter, "Invalid pool handle";
    PoolLedgerTerminated = 302, InvalidState, "Pool ledger terminated";
    LedgerNoConsensusError = 303, ConsensusOrTimeout, "No consensus during ledger operation";
    LedgerInvalidTransaction = 304, InvalidParameter, "Invalid ledger transaction";
    LedgerSecurityError = 305, Crypto, "Insufficient privileges for ledger transaction";
    PoolLedgerConfigAlreadyExistsError = 306, AlreadyExists, "Pool ledger config already exists";
    PoolLedgerTimeout = 307, ConsensusOrTimeout, "Pool ledger timeout";
    PoolIncompatibleProtocolVersion = 308, InvalidState, "Incompatible pool protocol version";
    LedgerNotFound = 309, NotFound, "Item not found on ledger";

    AnoncredsRevocationRegistryFullError = 400, InvalidState, "Revocation registry is full";
    AnoncredsInvalidUserRevocId = 401, InvalidParameter, "Invalid user revocation id";
    AnoncredsMasterSecretDuplicateNameError = 404, AlreadyExists, "Master secret with this name already exists";
    AnoncredsProofRejected = 405, Crypto, "Proof rejected";
    AnoncredsCredentialRevoked = 406, InvalidState, "Credential revoked";
    AnoncredsCredDefAlreadyExistsError = 407, AlreadyExists, "Credential definition already exists";

    UnknownCryptoTypeError = 500, Crypto, "Unknown crypto type";

    DidAlreadyExistsError = 600, AlreadyExists, "DID already exists";

    PaymentUnknownMethodError = 700, Payment, "Unknown payment method";
    PaymentIncompatibleMethodsError = 701, Payment, "Incompatible payment methods";
    PaymentInsufficientFundsError = 702, Payment, "Insufficient funds on inputs";
    PaymentSourceDoesNotExistError = 703, Payment, "Payment source does not exist";
    PaymentOperationNotSupportedError = 704, Payment, "Operation not supported by payment method";
    PaymentExtraFundsError = 705, Payment, "Extra funds on inputs";
    TransactionNotAllowedError = 706, Payment, "Transaction not allowed for requester";
}

impl ErrorCode {
    pub fn is_success(self) -> bool {
        self == ErrorCode::Success
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self, self.description())
    }
}

impl From<i32> for ErrorCode {
    fn from(raw: i32) -> Self {
        ErrorCode::lookup(raw)
    }
}

// -------------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod error_code_tests {
    use super::*;

    #[test]
    fn known_codes_keep_their_value() {
        for raw in [0, 100, 113, 114, 212, 307, 407, 500, 600, 706] {
            let code = ErrorCode::lookup(raw);
            assert_ne!(code, ErrorCode::UnknownNativeError, "{} should be known", raw);
            assert_eq!(code as i32, raw);
        }
    }

    #[test]
    fn unknown_codes_map_to_generic_kind() {
        for raw in [-3, 1, 99, 130, 215, 402, 9999, i32::MAX, i32::MIN] {
            assert_eq!(ErrorCode::lookup(raw), ErrorCode::UnknownNativeError);
        }
        assert_eq!(
            ErrorCode::UnknownNativeError.category(),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn categories() {
        assert_eq!(ErrorCode::lookup(0).category(), ErrorCategory::Success);
        assert_eq!(ErrorCode::lookup(104).category(), ErrorCategory::InvalidParameter);
        assert_eq!(ErrorCode::lookup(112).category(), ErrorCategory::InvalidState);
        assert_eq!(ErrorCode::lookup(114).category(), ErrorCategory::Io);
        assert_eq!(ErrorCode::lookup(309).category(), ErrorCategory::NotFound);
        assert_eq!(ErrorCode::lookup(203).category(), ErrorCategory::AlreadyExists);
        assert_eq!(ErrorCode::lookup(303).category(), ErrorCategory::ConsensusOrTimeout);
        assert_eq!(ErrorCode::lookup(500).category(), ErrorCategory::Crypto);
        assert_eq!(ErrorCode::lookup(210).category(), ErrorCategory::WalletStorage);
        assert_eq!(ErrorCode::lookup(702).category(), ErrorCategory::Payment);
    }

    #[test]
    fn display_includes_description() {
        let text = ErrorCode::CommonInvalidStructure.to_string();
        assert!(text.starts_with("CommonInvalidStructure"));
        assert!(text.contains("invalid structure"));
    }
}
