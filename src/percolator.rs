#![deny(unsafe_code)]

//! Percolator client: slab decoder and instruction encoder for the Percolator program.
//!
//! Everything here is a pure function of bytes. Fetching, signing and submitting are
//! left to the caller through the traits in [`client`].

// 1. mod constants
pub mod constants {
    pub const MAGIC: u64 = 0x504552434f4c4154; // "PERCOLAT"
    pub const VERSION: u32 = 1;

    pub const HEADER_LEN: usize = 72;
    pub const CONFIG_OFF: usize = HEADER_LEN;
    pub const CONFIG_LEN: usize = 320;
    pub const ENGINE_OFF: usize = CONFIG_OFF + CONFIG_LEN;
    pub const PARAMS_LEN: usize = 144;
    pub const ACCOUNT_LEN: usize = 240;

    /// Largest slot capacity addressable by a u16 index (u16::MAX is reserved).
    pub const MAX_SLOT_CAPACITY: usize = u16::MAX as usize;

    /// Sentinel value for permissionless crank (no caller account required)
    pub const CRANK_NO_CALLER: u16 = u16::MAX;

    pub const FLAG_RESOLVED: u8 = 1 << 0;
    pub const FLAG_PAUSED: u8 = 1 << 1;

    pub const fn align_up(x: usize, a: usize) -> usize {
        (x + (a - 1)) & !(a - 1)
    }

    /// SlabHeader field offsets.
    pub mod header {
        pub const MAGIC: usize = 0;
        pub const VERSION: usize = 8;
        pub const BUMP: usize = 12;
        pub const FLAGS: usize = 13;
        pub const ADMIN: usize = 16;
        // _reserved[0..8] = nonce, [8..16] = last threshold update slot
        pub const NONCE: usize = 48;
        pub const LAST_THR_UPDATE_SLOT: usize = 56;
    }

    /// MarketConfig field offsets, relative to CONFIG_OFF.
    pub mod config {
        pub const COLLATERAL_MINT: usize = 0;
        pub const VAULT_PUBKEY: usize = 32;
        pub const INDEX_FEED_ID: usize = 64;
        pub const MAX_STALENESS_SECS: usize = 96;
        pub const CONF_FILTER_BPS: usize = 104;
        pub const VAULT_AUTHORITY_BUMP: usize = 106;
        pub const INVERT: usize = 107;
        pub const UNIT_SCALE: usize = 108;
        pub const FUNDING_HORIZON_SLOTS: usize = 112;
        pub const FUNDING_K_BPS: usize = 120;
        pub const FUNDING_INV_SCALE_NOTIONAL_E6: usize = 128;
        pub const FUNDING_MAX_PREMIUM_BPS: usize = 144;
        pub const FUNDING_MAX_BPS_PER_SLOT: usize = 152;
        pub const THRESH_FLOOR: usize = 160;
        pub const THRESH_RISK_BPS: usize = 176;
        pub const THRESH_UPDATE_INTERVAL_SLOTS: usize = 184;
        pub const THRESH_STEP_BPS: usize = 192;
        pub const THRESH_ALPHA_BPS: usize = 200;
        pub const THRESH_MIN: usize = 208;
        pub const THRESH_MAX: usize = 224;
        pub const THRESH_MIN_STEP: usize = 240;
        pub const ORACLE_AUTHORITY: usize = 256;
        pub const AUTHORITY_PRICE_E6: usize = 288;
        pub const AUTHORITY_TIMESTAMP: usize = 296;
        pub const ORACLE_PRICE_CAP_E2BPS: usize = 304;
        pub const LAST_EFFECTIVE_PRICE_E6: usize = 312;
    }

    /// RiskParams field offsets, relative to the start of the params block.
    pub mod params {
        pub const WARMUP_PERIOD_SLOTS: usize = 0;
        pub const MAINTENANCE_MARGIN_BPS: usize = 8;
        pub const INITIAL_MARGIN_BPS: usize = 16;
        pub const TRADING_FEE_BPS: usize = 24;
        pub const MAX_ACCOUNTS: usize = 32;
        pub const NEW_ACCOUNT_FEE: usize = 40;
        pub const RISK_REDUCTION_THRESHOLD: usize = 56;
        pub const MAINTENANCE_FEE_PER_SLOT: usize = 72;
        pub const MAX_CRANK_STALENESS_SLOTS: usize = 88;
        pub const LIQUIDATION_FEE_BPS: usize = 96;
        pub const LIQUIDATION_FEE_CAP: usize = 104;
        pub const LIQUIDATION_BUFFER_BPS: usize = 120;
        pub const MIN_LIQUIDATION_ABS: usize = 128;
    }

    /// Risk engine field offsets, relative to ENGINE_OFF.
    ///
    /// Everything after `USED_BITMAP` moves with the slot capacity and is computed by
    /// [`crate::state::SlabLayout`].
    pub mod engine {
        pub const VAULT: usize = 0;
        pub const INSURANCE_BALANCE: usize = 16;
        pub const INSURANCE_FEE_REVENUE: usize = 32;
        pub const PARAMS: usize = 48;
        pub const CURRENT_SLOT: usize = 192;
        pub const FUNDING_INDEX_QPB_E6: usize = 200;
        pub const LAST_FUNDING_SLOT: usize = 216;
        pub const FUNDING_RATE_BPS_PER_SLOT_LAST: usize = 224;
        pub const LAST_CRANK_SLOT: usize = 232;
        pub const MAX_CRANK_STALENESS_SLOTS: usize = 240;
        pub const TOTAL_OPEN_INTEREST: usize = 248;
        pub const C_TOT: usize = 264;
        pub const PNL_POS_TOT: usize = 280;
        // 296..328: crank/gc cursors and sweep slots (not exposed)
        pub const LIFETIME_LIQUIDATIONS: usize = 328;
        pub const LIFETIME_FORCE_REALIZE_CLOSES: usize = 336;
        pub const NET_LP_POS: usize = 344;
        pub const LP_SUM_ABS: usize = 360;
        pub const LP_MAX_ABS: usize = 376;
        // 392: lp_max_abs_sweep (in-progress value, not exposed)
        pub const USED_BITMAP: usize = 408;
    }

    /// Account record field offsets, relative to the record start.
    pub mod account {
        pub const ACCOUNT_ID: usize = 0;
        pub const CAPITAL: usize = 8;
        pub const KIND: usize = 24;
        /// 16-byte slot; the low word carries the value in two's complement.
        pub const PNL: usize = 32;
        pub const RESERVED_PNL: usize = 48;
        pub const WARMUP_STARTED_AT_SLOT: usize = 56;
        pub const WARMUP_SLOPE_PER_STEP: usize = 64;
        pub const POSITION_SIZE: usize = 80;
        pub const ENTRY_PRICE: usize = 96;
        pub const FUNDING_INDEX: usize = 104;
        pub const MATCHER_PROGRAM: usize = 120;
        pub const MATCHER_CONTEXT: usize = 152;
        pub const OWNER: usize = 184;
        pub const FEE_CREDITS: usize = 216;
        pub const LAST_FEE_SLOT: usize = 232;
    }

    const _: () = assert!(config::LAST_EFFECTIVE_PRICE_E6 + 8 == CONFIG_LEN);
    const _: () = assert!(engine::PARAMS + PARAMS_LEN == engine::CURRENT_SLOT);
    const _: () = assert!(account::LAST_FEE_SLOT + 8 == ACCOUNT_LEN);
}

// 2. mod layout
pub mod layout {
    //! Bounds-checked little-endian access at fixed byte offsets.

    use crate::error::{DecodeError, OutOfBounds};
    use arrayref::array_ref;
    use core::mem::size_of;
    use num_traits::FromPrimitive;
    use solana_program::pubkey::Pubkey;

    /// Borrow `len` bytes at `offset`.
    #[inline]
    pub fn bytes_at<'a>(
        data: &'a [u8],
        offset: usize,
        len: usize,
        field: &'static str,
    ) -> Result<&'a [u8], OutOfBounds> {
        offset
            .checked_add(len)
            .and_then(|end| data.get(offset..end))
            .ok_or(OutOfBounds { field, offset, len, buf_len: data.len() })
    }

    #[inline]
    pub fn bytes_at_mut<'a>(
        data: &'a mut [u8],
        offset: usize,
        len: usize,
        field: &'static str,
    ) -> Result<&'a mut [u8], OutOfBounds> {
        let buf_len = data.len();
        match offset.checked_add(len) {
            Some(end) if end <= buf_len => Ok(&mut data[offset..end]),
            _ => Err(OutOfBounds { field, offset, len, buf_len }),
        }
    }

    macro_rules! le_access {
        ($($read:ident, $write:ident => $t:ty;)*) => {
            $(
                #[inline]
                pub fn $read(data: &[u8], offset: usize, field: &'static str) -> Result<$t, OutOfBounds> {
                    let src = bytes_at(data, offset, size_of::<$t>(), field)?;
                    Ok(<$t>::from_le(bytemuck::pod_read_unaligned(src)))
                }

                #[inline]
                pub fn $write(
                    data: &mut [u8],
                    offset: usize,
                    value: $t,
                    field: &'static str,
                ) -> Result<(), OutOfBounds> {
                    bytes_at_mut(data, offset, size_of::<$t>(), field)?.copy_from_slice(&value.to_le_bytes());
                    Ok(())
                }
            )*
        };
    }

    le_access! {
        read_u8, write_u8 => u8;
        read_u16, write_u16 => u16;
        read_u32, write_u32 => u32;
        read_u64, write_u64 => u64;
        read_u128, write_u128 => u128;
        read_i8, write_i8 => i8;
        read_i16, write_i16 => i16;
        read_i32, write_i32 => i32;
        read_i64, write_i64 => i64;
        read_i128, write_i128 => i128;
    }

    /// Single byte, nonzero = true.
    #[inline]
    pub fn read_bool(data: &[u8], offset: usize, field: &'static str) -> Result<bool, OutOfBounds> {
        Ok(read_u8(data, offset, field)? != 0)
    }

    #[inline]
    pub fn write_bool(data: &mut [u8], offset: usize, value: bool, field: &'static str) -> Result<(), OutOfBounds> {
        write_u8(data, offset, value as u8, field)
    }

    #[inline]
    pub fn read_bytes32(data: &[u8], offset: usize, field: &'static str) -> Result<[u8; 32], OutOfBounds> {
        let src = bytes_at(data, offset, 32, field)?;
        Ok(*array_ref![src, 0, 32])
    }

    #[inline]
    pub fn read_pubkey(data: &[u8], offset: usize, field: &'static str) -> Result<Pubkey, OutOfBounds> {
        read_bytes32(data, offset, field).map(Pubkey::new_from_array)
    }

    #[inline]
    pub fn write_pubkey(
        data: &mut [u8],
        offset: usize,
        value: &Pubkey,
        field: &'static str,
    ) -> Result<(), OutOfBounds> {
        bytes_at_mut(data, offset, 32, field)?.copy_from_slice(value.as_ref());
        Ok(())
    }

    /// Single-byte tag mapped onto a closed enum. Unknown tags are an error.
    pub fn read_enum<T: FromPrimitive>(data: &[u8], offset: usize, field: &'static str) -> Result<T, DecodeError> {
        let tag = read_u8(data, offset, field)?;
        T::from_u8(tag).ok_or(DecodeError::InvalidEnumTag { field, offset, tag })
    }

    /// Reinterpret the low `width_bits` of `raw` as two's complement.
    ///
    /// Values strictly above 2^(width-1) have 2^width subtracted.
    pub const fn recover_signed(raw: u128, width_bits: u32) -> i128 {
        match width_bits {
            0 => 0,
            128.. => raw as i128,
            w => {
                let raw = raw & ((1u128 << w) - 1);
                if raw > (1u128 << (w - 1)) {
                    raw as i128 - (1i128 << w)
                } else {
                    raw as i128
                }
            }
        }
    }

    /// Sequential reader over an instruction payload.
    #[derive(Clone, Debug)]
    pub struct Cursor<'a> {
        data: &'a [u8],
        pos: usize,
    }

    macro_rules! cursor_read {
        ($($name:ident => $t:ty;)*) => {
            $(
                #[inline]
                pub fn $name(&mut self, field: &'static str) -> Result<$t, DecodeError> {
                    let value = self::$name(self.data, self.pos, field)?;
                    self.pos += size_of::<$t>();
                    Ok(value)
                }
            )*
        };
    }

    impl<'a> Cursor<'a> {
        pub fn new(data: &'a [u8]) -> Self {
            Self { data, pos: 0 }
        }

        pub fn position(&self) -> usize {
            self.pos
        }

        pub fn remaining(&self) -> usize {
            self.data.len().saturating_sub(self.pos)
        }

        cursor_read! {
            read_u8 => u8;
            read_u16 => u16;
            read_u32 => u32;
            read_u64 => u64;
            read_u128 => u128;
            read_i64 => i64;
            read_i128 => i128;
        }

        pub fn read_bool(&mut self, field: &'static str) -> Result<bool, DecodeError> {
            Ok(self.read_u8(field)? != 0)
        }

        pub fn read_bytes32(&mut self, field: &'static str) -> Result<[u8; 32], DecodeError> {
            let value = self::read_bytes32(self.data, self.pos, field)?;
            self.pos += 32;
            Ok(value)
        }

        pub fn read_pubkey(&mut self, field: &'static str) -> Result<Pubkey, DecodeError> {
            self.read_bytes32(field).map(Pubkey::new_from_array)
        }
    }

    /// Sequential little-endian writer for instruction payloads.
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct ByteWriter {
        buf: Vec<u8>,
    }

    macro_rules! writer_put {
        ($($name:ident => $t:ty;)*) => {
            $(
                #[inline]
                pub fn $name(&mut self, value: $t) -> &mut Self {
                    self.buf.extend_from_slice(&value.to_le_bytes());
                    self
                }
            )*
        };
    }

    impl ByteWriter {
        pub fn with_tag(tag: u8) -> Self {
            Self { buf: vec![tag] }
        }

        writer_put! {
            put_u8 => u8;
            put_u16 => u16;
            put_u32 => u32;
            put_u64 => u64;
            put_u128 => u128;
            put_i64 => i64;
            put_i128 => i128;
        }

        pub fn put_bool(&mut self, value: bool) -> &mut Self {
            self.put_u8(value as u8)
        }

        pub fn put_bytes32(&mut self, value: &[u8; 32]) -> &mut Self {
            self.buf.extend_from_slice(value);
            self
        }

        pub fn put_pubkey(&mut self, value: &Pubkey) -> &mut Self {
            self.buf.extend_from_slice(value.as_ref());
            self
        }

        pub fn len(&self) -> usize {
            self.buf.len()
        }

        pub fn is_empty(&self) -> bool {
            self.buf.is_empty()
        }

        pub fn into_inner(self) -> Vec<u8> {
            self.buf
        }
    }
}

// 3. mod error
pub mod error {
    use num_derive::FromPrimitive;
    use num_traits::FromPrimitive;
    use solana_program::pubkey::Pubkey;
    use thiserror::Error;

    pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

    #[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
    #[error("{field}: {len} bytes at offset {offset} overrun buffer of {buf_len} bytes")]
    pub struct OutOfBounds {
        pub field: &'static str,
        pub offset: usize,
        pub len: usize,
        pub buf_len: usize,
    }

    #[derive(Clone, Debug, Error, PartialEq, Eq)]
    pub enum DecodeError {
        #[error(transparent)]
        OutOfBounds(#[from] OutOfBounds),
        #[error("{field}: unknown tag {tag} at offset {offset}")]
        InvalidEnumTag {
            field: &'static str,
            offset: usize,
            tag: u8,
        },
        #[error("slab magic {found:#018x} does not match, account is not an initialized slab")]
        InvalidMagic { found: u64 },
        #[error("slab layout version {found} is not supported")]
        UnsupportedVersion { found: u32 },
        #[error("slab is {found} bytes, layout expects {expected}")]
        InvalidSlabLen { expected: usize, found: usize },
        #[error("empty instruction payload")]
        EmptyInstruction,
        #[error("unknown instruction tag {0}")]
        UnknownInstruction(u8),
    }

    #[derive(Clone, Debug, Error, PartialEq, Eq)]
    pub enum EncodeError {
        #[error("{field}: {value} is out of range ({range})")]
        OutOfRange {
            field: &'static str,
            value: String,
            range: &'static str,
        },
    }

    impl EncodeError {
        pub(crate) fn out_of_range(field: &'static str, value: impl ToString, range: &'static str) -> Self {
            EncodeError::OutOfRange { field, value: value.to_string(), range }
        }

        /// Slot indices are u16 with u16::MAX reserved for the crank sentinel.
        pub(crate) fn index(field: &'static str, value: impl ToString) -> Self {
            Self::out_of_range(field, value, "0..=65534")
        }
    }

    #[derive(Clone, Debug, Error, PartialEq, Eq)]
    #[error("{instruction}: expected {expected} accounts, got {got}")]
    pub struct SchemaMismatchError {
        pub instruction: &'static str,
        pub expected: usize,
        pub got: usize,
    }

    /// The program's custom error set, in declaration order.
    ///
    /// The on-chain program returns `ProgramError::Custom(variant as u32)`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
    pub enum PercolatorError {
        InvalidMagic,
        InvalidVersion,
        AlreadyInitialized,
        NotInitialized,
        InvalidSlabLen,
        InvalidOracleKey,
        OracleStale,
        OracleConfTooWide,
        InvalidVaultAta,
        InvalidMint,
        ExpectedSigner,
        ExpectedWritable,
        OracleInvalid,
        EngineInsufficientBalance,
        EngineUndercollateralized,
        EngineUnauthorized,
        EngineInvalidMatchingEngine,
        EnginePnlNotWarmedUp,
        EngineOverflow,
        EngineAccountNotFound,
        EngineNotAnLPAccount,
        EnginePositionSizeMismatch,
        EngineRiskReductionOnlyMode,
        EngineAccountKindMismatch,
        InvalidTokenAccount,
        InvalidTokenProgram,
        InvalidConfigParam,
        HyperpTradeNoCpiDisabled,
    }

    /// Anchor-style custom error base. Codes at or above it are offset ordinals.
    pub const CUSTOM_ERROR_BASE: u32 = 6000;

    impl PercolatorError {
        pub fn from_code(code: u32) -> Option<Self> {
            Self::from_u32(code).or_else(|| code.checked_sub(CUSTOM_ERROR_BASE).and_then(Self::from_u32))
        }

        pub fn name(self) -> &'static str {
            use PercolatorError::*;
            match self {
                InvalidMagic => "InvalidMagic",
                InvalidVersion => "InvalidVersion",
                AlreadyInitialized => "AlreadyInitialized",
                NotInitialized => "NotInitialized",
                InvalidSlabLen => "InvalidSlabLen",
                InvalidOracleKey => "InvalidOracleKey",
                OracleStale => "OracleStale",
                OracleConfTooWide => "OracleConfTooWide",
                InvalidVaultAta => "InvalidVaultAta",
                InvalidMint => "InvalidMint",
                ExpectedSigner => "ExpectedSigner",
                ExpectedWritable => "ExpectedWritable",
                OracleInvalid => "OracleInvalid",
                EngineInsufficientBalance => "EngineInsufficientBalance",
                EngineUndercollateralized => "EngineUndercollateralized",
                EngineUnauthorized => "EngineUnauthorized",
                EngineInvalidMatchingEngine => "EngineInvalidMatchingEngine",
                EnginePnlNotWarmedUp => "EnginePnlNotWarmedUp",
                EngineOverflow => "EngineOverflow",
                EngineAccountNotFound => "EngineAccountNotFound",
                EngineNotAnLPAccount => "EngineNotAnLPAccount",
                EnginePositionSizeMismatch => "EnginePositionSizeMismatch",
                EngineRiskReductionOnlyMode => "EngineRiskReductionOnlyMode",
                EngineAccountKindMismatch => "EngineAccountKindMismatch",
                InvalidTokenAccount => "InvalidTokenAccount",
                InvalidTokenProgram => "InvalidTokenProgram",
                InvalidConfigParam => "InvalidConfigParam",
                HyperpTradeNoCpiDisabled => "HyperpTradeNoCpiDisabled",
            }
        }

        pub fn hint(self) -> Option<&'static str> {
            use PercolatorError::*;
            Some(match self {
                InvalidMagic | InvalidVersion => "The account is not a percolator slab for this program version.",
                AlreadyInitialized => "The market or account already exists.",
                NotInitialized => "The market has not been initialized yet.",
                InvalidSlabLen => "Slab account size does not match the program build.",
                InvalidOracleKey => "Oracle account does not match the market's price feed.",
                OracleStale => "Oracle price is stale. Push a fresh price or crank the market.",
                OracleConfTooWide => "Oracle confidence interval is too wide. Retry later.",
                InvalidVaultAta | InvalidTokenAccount => "Token account does not match the market vault or mint.",
                InvalidMint => "Token mint does not match the market collateral.",
                ExpectedSigner => "A required signer is missing.",
                ExpectedWritable => "An account that must be writable was passed read-only.",
                EngineInsufficientBalance => "Not enough collateral for this operation.",
                EngineUndercollateralized => "Position would fall below the margin requirement.",
                EngineUnauthorized => "Signer does not own this account.",
                EngineInvalidMatchingEngine => "Matcher program or context does not match the LP.",
                EnginePnlNotWarmedUp => "Profit is still warming up and cannot be withdrawn yet.",
                EngineAccountNotFound => "No account at that slot index.",
                EngineNotAnLPAccount => "Counterparty index is not an LP account.",
                EngineRiskReductionOnlyMode => {
                    "Market is in risk-reduction mode. Only position-reducing trades are allowed."
                }
                EngineAccountKindMismatch => "Account kind does not match the instruction.",
                InvalidTokenProgram => "Pass the SPL token program.",
                InvalidConfigParam => "A configuration value is outside its allowed range.",
                HyperpTradeNoCpiDisabled => "Direct trades are disabled on this market. Trade through a matcher.",
                OracleInvalid | EngineOverflow | EnginePositionSizeMismatch => return None,
            })
        }
    }

    /// A program error code pulled out of execution logs.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TranslatedError {
        pub code: u32,
        pub error: PercolatorError,
        pub name: &'static str,
        pub hint: Option<&'static str>,
    }

    pub const ERROR_MARKER: &str = "custom program error: ";

    pub fn translate_code(code: u32) -> Option<TranslatedError> {
        let error = PercolatorError::from_code(code)?;
        Some(TranslatedError { code, error, name: error.name(), hint: error.hint() })
    }

    /// Code following the marker in one log line, hex (`0x..`) or decimal.
    pub fn extract_error_code(line: &str) -> Option<u32> {
        let start = line.find(ERROR_MARKER)? + ERROR_MARKER.len();
        let rest = &line[start..];
        let (digits, radix) = match rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            Some(hex) => (hex, 16),
            None => (rest, 10),
        };
        let end = digits
            .char_indices()
            .find(|(_, c)| !c.is_digit(radix))
            .map_or(digits.len(), |(i, _)| i);
        u32::from_str_radix(&digits[..end], radix).ok()
    }

    /// First recognisable program error in `logs`, or None.
    pub fn parse_error_from_logs<S: AsRef<str>>(logs: &[S]) -> Option<TranslatedError> {
        logs.iter().map(AsRef::as_ref).filter(|line| line.contains(ERROR_MARKER)).find_map(|line| {
            match extract_error_code(line) {
                Some(code) => {
                    let translated = translate_code(code);
                    if translated.is_none() {
                        log::warn!("unrecognised program error code {code} in log line: {line}");
                    }
                    translated
                }
                None => {
                    log::warn!("unparseable program error code in log line: {line}");
                    None
                }
            }
        })
    }

    #[derive(Clone, Debug, Error, PartialEq, Eq)]
    pub enum ProgramExecutionError {
        #[error("{name} (0x{code:x})")]
        Program {
            code: u32,
            name: &'static str,
            hint: Option<&'static str>,
            logs: Vec<String>,
        },
        #[error("transaction failed: {message}")]
        Raw { message: String, logs: Vec<String> },
    }

    impl ProgramExecutionError {
        /// Build from a failed execution: translated when the logs name a known code.
        pub fn from_failure(message: impl Into<String>, logs: Vec<String>) -> Self {
            match parse_error_from_logs(&logs) {
                Some(t) => ProgramExecutionError::Program { code: t.code, name: t.name, hint: t.hint, logs },
                None => ProgramExecutionError::Raw { message: message.into(), logs },
            }
        }

        pub fn hint(&self) -> Option<&'static str> {
            match self {
                ProgramExecutionError::Program { hint, .. } => *hint,
                ProgramExecutionError::Raw { .. } => None,
            }
        }

        pub fn logs(&self) -> &[String] {
            match self {
                ProgramExecutionError::Program { logs, .. } | ProgramExecutionError::Raw { logs, .. } => logs,
            }
        }
    }

    #[derive(Debug, Error)]
    pub enum ClientError {
        #[error(transparent)]
        Decode(#[from] DecodeError),
        #[error(transparent)]
        Encode(#[from] EncodeError),
        #[error(transparent)]
        Schema(#[from] SchemaMismatchError),
        #[error(transparent)]
        Execution(#[from] ProgramExecutionError),
        #[error("fetching account {address} failed: {source}")]
        Fetch {
            address: Pubkey,
            #[source]
            source: BoxError,
        },
        #[error("submitting transaction failed: {0}")]
        Submit(#[source] BoxError),
        #[error("rejected before submission: {0}")]
        Rejected(String),
    }
}

// 4. mod state
pub mod state {
    use crate::constants::{
        account, align_up, config, engine, header, params, ACCOUNT_LEN, CONFIG_OFF, ENGINE_OFF,
        FLAG_PAUSED, FLAG_RESOLVED, HEADER_LEN, MAGIC, MAX_SLOT_CAPACITY, VERSION,
    };
    use crate::error::{DecodeError, OutOfBounds};
    use crate::layout::{
        read_bool, read_enum, read_i128, read_i64, read_pubkey, read_u128, read_u16, read_u32,
        read_u64, read_u8, recover_signed,
    };
    use crate::units::{self, COLLATERAL_DECIMALS, PRICE_DECIMALS};
    use num_derive::FromPrimitive;
    use solana_program::pubkey::Pubkey;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SlabHeader {
        pub magic: u64,
        pub version: u32,
        pub bump: u8,
        pub flags: u8,
        pub admin: Pubkey,
        pub nonce: u64,
        pub last_thr_update_slot: u64,
    }

    impl SlabHeader {
        pub fn resolved(&self) -> bool {
            self.flags & FLAG_RESOLVED != 0
        }

        pub fn paused(&self) -> bool {
            self.flags & FLAG_PAUSED != 0
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MarketConfig {
        pub collateral_mint: Pubkey,
        pub vault_pubkey: Pubkey,
        /// Oracle price feed. The terminal passes it as the oracle account.
        pub index_feed_id: Pubkey,
        pub max_staleness_secs: u64,
        pub conf_filter_bps: u16,
        pub vault_authority_bump: u8,
        pub invert: bool,
        pub unit_scale: u32,

        // Funding
        pub funding_horizon_slots: u64,
        pub funding_k_bps: u64,
        pub funding_inv_scale_notional_e6: u128,
        pub funding_max_premium_bps: i64,
        pub funding_max_bps_per_slot: i64,

        // Insurance threshold
        pub thresh_floor: u128,
        pub thresh_risk_bps: u64,
        pub thresh_update_interval_slots: u64,
        pub thresh_step_bps: u64,
        pub thresh_alpha_bps: u64,
        pub thresh_min: u128,
        pub thresh_max: u128,
        pub thresh_min_step: u128,

        // Admin oracle
        pub oracle_authority: Pubkey,
        pub authority_price_e6: u64,
        pub authority_timestamp: i64,
        pub oracle_price_cap_e2bps: u64,
        pub last_effective_price_e6: u64,
    }

    impl MarketConfig {
        /// An all-zero authority means no admin oracle is configured.
        pub fn has_oracle_authority(&self) -> bool {
            self.oracle_authority != Pubkey::default()
        }
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RiskParams {
        pub warmup_period_slots: u64,
        pub maintenance_margin_bps: u64,
        pub initial_margin_bps: u64,
        pub trading_fee_bps: u64,
        pub max_accounts: u64,
        pub new_account_fee: u128,
        pub risk_reduction_threshold: u128,
        pub maintenance_fee_per_slot: u128,
        pub max_crank_staleness_slots: u64,
        pub liquidation_fee_bps: u64,
        pub liquidation_fee_cap: u128,
        pub liquidation_buffer_bps: u64,
        pub min_liquidation_abs: u128,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InsuranceFund {
        pub balance: u128,
        pub fee_revenue: u128,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EngineState {
        pub vault: u128,
        pub insurance_fund: InsuranceFund,
        pub current_slot: u64,
        pub funding_index_qpb_e6: i128,
        pub last_funding_slot: u64,
        pub funding_rate_bps_per_slot_last: i64,
        pub last_crank_slot: u64,
        pub max_crank_staleness_slots: u64,
        pub total_open_interest: u128,
        pub c_tot: u128,
        pub pnl_pos_tot: u128,
        pub lifetime_liquidations: u64,
        pub lifetime_force_realize_closes: u64,
        pub net_lp_pos: i128,
        pub lp_sum_abs: u128,
        pub lp_max_abs: u128,
        pub num_used_accounts: u16,
        pub next_account_id: u64,
    }

    impl EngineState {
        pub fn vault_ui(&self) -> f64 {
            units::amount_to_ui(self.vault, COLLATERAL_DECIMALS)
        }

        pub fn insurance_ui(&self) -> f64 {
            units::amount_to_ui(self.insurance_fund.balance, COLLATERAL_DECIMALS)
        }

        /// Slots since the last crank, saturating at zero.
        pub fn crank_age(&self) -> u64 {
            self.current_slot.saturating_sub(self.last_crank_slot)
        }
    }

    #[repr(u8)]
    #[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
    pub enum AccountKind {
        User = 0,
        Lp = 1,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Account {
        pub account_id: u64,
        pub kind: AccountKind,
        pub owner: Pubkey,
        pub capital: u128,
        pub pnl: i128,
        pub reserved_pnl: u64,
        pub warmup_started_at_slot: u64,
        pub warmup_slope_per_step: u128,
        pub position_size: i128,
        pub entry_price: u64,
        pub funding_index: i128,
        pub matcher_program: Pubkey,
        pub matcher_context: Pubkey,
        pub fee_credits: i128,
        pub last_fee_slot: u64,
    }

    impl Account {
        pub fn is_lp(&self) -> bool {
            self.kind == AccountKind::Lp
        }

        pub fn is_user(&self) -> bool {
            self.kind == AccountKind::User
        }

        pub fn capital_ui(&self) -> f64 {
            units::amount_to_ui(self.capital, COLLATERAL_DECIMALS)
        }

        pub fn pnl_ui(&self) -> f64 {
            units::signed_to_ui(self.pnl, COLLATERAL_DECIMALS)
        }

        pub fn position_ui(&self) -> f64 {
            units::signed_to_ui(self.position_size, COLLATERAL_DECIMALS)
        }

        pub fn entry_price_ui(&self) -> f64 {
            units::amount_to_ui(self.entry_price as u128, PRICE_DECIMALS)
        }

        pub fn has_position(&self) -> bool {
            self.position_size != 0
        }
    }

    /// A decoded slab, minus the account table.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Slab {
        pub header: SlabHeader,
        pub config: MarketConfig,
        pub engine: EngineState,
        pub params: RiskParams,
    }

    impl Slab {
        pub fn resolved(&self) -> bool {
            self.header.resolved()
        }
    }

    /// Byte offsets of the capacity-dependent part of the slab.
    ///
    /// Everything up to the used bitmap is fixed. The bitmap, freelist and account
    /// table scale with `max_accounts`, which the program fixes at compile time.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SlabLayout {
        max_accounts: usize,
    }

    impl SlabLayout {
        pub const PRODUCTION: Self = Self::new(4096);
        pub const SMALL: Self = Self::new(64);

        #[cfg(not(feature = "small-slab"))]
        pub const DEFAULT: Self = Self::PRODUCTION;
        #[cfg(feature = "small-slab")]
        pub const DEFAULT: Self = Self::SMALL;

        /// Capacities above the u16 index space are clamped.
        pub const fn new(max_accounts: usize) -> Self {
            let max_accounts = if max_accounts > MAX_SLOT_CAPACITY { MAX_SLOT_CAPACITY } else { max_accounts };
            Self { max_accounts }
        }

        pub const fn max_accounts(&self) -> usize {
            self.max_accounts
        }

        pub const fn bitmap_words(&self) -> usize {
            (self.max_accounts + 63) / 64
        }

        pub const fn bitmap_off(&self) -> usize {
            ENGINE_OFF + engine::USED_BITMAP
        }

        pub const fn num_used_off(&self) -> usize {
            self.bitmap_off() + self.bitmap_words() * 8
        }

        pub const fn next_account_id_off(&self) -> usize {
            align_up(self.num_used_off() + 2, 8)
        }

        pub const fn free_head_off(&self) -> usize {
            self.next_account_id_off() + 8
        }

        pub const fn next_free_off(&self) -> usize {
            self.free_head_off() + 2
        }

        pub const fn accounts_off(&self) -> usize {
            align_up(self.next_free_off() + 2 * self.max_accounts, 8)
        }

        pub const fn account_off(&self, idx: usize) -> usize {
            self.accounts_off() + idx * ACCOUNT_LEN
        }

        /// Exact account data length the program allocates for this capacity.
        pub const fn slab_len(&self) -> usize {
            self.account_off(self.max_accounts)
        }

        /// Fails unless `data` is exactly one slab of this capacity.
        pub fn check_len(&self, data: &[u8]) -> Result<(), DecodeError> {
            if data.len() != self.slab_len() {
                return Err(DecodeError::InvalidSlabLen { expected: self.slab_len(), found: data.len() });
            }
            Ok(())
        }

        pub fn decode(&self, data: &[u8]) -> Result<Slab, DecodeError> {
            let header = decode_header(data)?;
            self.check_len(data)?;
            let slab = Slab {
                header,
                config: decode_config(data)?,
                engine: self.decode_engine(data)?,
                params: decode_params(data)?,
            };
            log::debug!(
                "decoded slab: version={} used={} slot={} resolved={}",
                slab.header.version,
                slab.engine.num_used_accounts,
                slab.engine.current_slot,
                slab.resolved()
            );
            Ok(slab)
        }

        pub fn decode_engine(&self, data: &[u8]) -> Result<EngineState, DecodeError> {
            self.check_len(data)?;
            let b = ENGINE_OFF;
            Ok(EngineState {
                vault: read_u128(data, b + engine::VAULT, "engine.vault")?,
                insurance_fund: InsuranceFund {
                    balance: read_u128(data, b + engine::INSURANCE_BALANCE, "engine.insurance_fund.balance")?,
                    fee_revenue: read_u128(
                        data,
                        b + engine::INSURANCE_FEE_REVENUE,
                        "engine.insurance_fund.fee_revenue",
                    )?,
                },
                current_slot: read_u64(data, b + engine::CURRENT_SLOT, "engine.current_slot")?,
                funding_index_qpb_e6: read_i128(data, b + engine::FUNDING_INDEX_QPB_E6, "engine.funding_index_qpb_e6")?,
                last_funding_slot: read_u64(data, b + engine::LAST_FUNDING_SLOT, "engine.last_funding_slot")?,
                funding_rate_bps_per_slot_last: read_i64(
                    data,
                    b + engine::FUNDING_RATE_BPS_PER_SLOT_LAST,
                    "engine.funding_rate_bps_per_slot_last",
                )?,
                last_crank_slot: read_u64(data, b + engine::LAST_CRANK_SLOT, "engine.last_crank_slot")?,
                max_crank_staleness_slots: read_u64(
                    data,
                    b + engine::MAX_CRANK_STALENESS_SLOTS,
                    "engine.max_crank_staleness_slots",
                )?,
                total_open_interest: read_u128(data, b + engine::TOTAL_OPEN_INTEREST, "engine.total_open_interest")?,
                c_tot: read_u128(data, b + engine::C_TOT, "engine.c_tot")?,
                pnl_pos_tot: read_u128(data, b + engine::PNL_POS_TOT, "engine.pnl_pos_tot")?,
                lifetime_liquidations: read_u64(
                    data,
                    b + engine::LIFETIME_LIQUIDATIONS,
                    "engine.lifetime_liquidations",
                )?,
                lifetime_force_realize_closes: read_u64(
                    data,
                    b + engine::LIFETIME_FORCE_REALIZE_CLOSES,
                    "engine.lifetime_force_realize_closes",
                )?,
                net_lp_pos: read_i128(data, b + engine::NET_LP_POS, "engine.net_lp_pos")?,
                lp_sum_abs: read_u128(data, b + engine::LP_SUM_ABS, "engine.lp_sum_abs")?,
                lp_max_abs: read_u128(data, b + engine::LP_MAX_ABS, "engine.lp_max_abs")?,
                num_used_accounts: read_u16(data, self.num_used_off(), "engine.num_used_accounts")?,
                next_account_id: read_u64(data, self.next_account_id_off(), "engine.next_account_id")?,
            })
        }

        /// Whether slot `idx` is marked used. Indices past capacity never are.
        pub fn is_used(&self, data: &[u8], idx: usize) -> Result<bool, DecodeError> {
            self.check_len(data)?;
            if idx >= self.max_accounts {
                return Ok(false);
            }
            let word = read_u64(data, self.bitmap_off() + (idx / 64) * 8, "engine.used")?;
            Ok((word >> (idx % 64)) & 1 == 1)
        }

        /// Used slot indices in ascending order, taken from the occupancy bitmap.
        pub fn decode_used_indices(&self, data: &[u8]) -> Result<Vec<u16>, DecodeError> {
            self.check_len(data)?;
            let base = self.bitmap_off();
            let mut out = Vec::new();
            for w in 0..self.bitmap_words() {
                let mut word = read_u64(data, base + w * 8, "engine.used")?;
                while word != 0 {
                    let idx = w * 64 + word.trailing_zeros() as usize;
                    if idx < self.max_accounts {
                        out.push(idx as u16);
                    }
                    word &= word - 1;
                }
            }
            Ok(out)
        }

        /// The account in slot `idx`, or None when the slot is free.
        pub fn decode_account_at(&self, data: &[u8], idx: u16) -> Result<Option<Account>, DecodeError> {
            let idx = idx as usize;
            if !self.is_used(data, idx)? {
                return Ok(None);
            }
            self.read_account(data, idx).map(Some)
        }

        pub fn decode_all_accounts(&self, data: &[u8]) -> Result<Vec<(u16, Account)>, DecodeError> {
            self.decode_used_indices(data)?
                .into_iter()
                .map(|idx| self.read_account(data, idx as usize).map(|acct| (idx, acct)))
                .collect()
        }

        /// First user (not LP) account owned by `owner`.
        pub fn find_user_account(&self, data: &[u8], owner: &Pubkey) -> Result<Option<(u16, Account)>, DecodeError> {
            for idx in self.decode_used_indices(data)? {
                let acct = self.read_account(data, idx as usize)?;
                if acct.is_user() && acct.owner == *owner {
                    return Ok(Some((idx, acct)));
                }
            }
            Ok(None)
        }

        fn read_account(&self, data: &[u8], idx: usize) -> Result<Account, DecodeError> {
            let b = self.account_off(idx);
            let pnl_raw = read_u64(data, b + account::PNL, "account.pnl")?;
            Ok(Account {
                account_id: read_u64(data, b + account::ACCOUNT_ID, "account.account_id")?,
                kind: read_enum::<AccountKind>(data, b + account::KIND, "account.kind")?,
                owner: read_pubkey(data, b + account::OWNER, "account.owner")?,
                capital: read_u128(data, b + account::CAPITAL, "account.capital")?,
                pnl: recover_signed(pnl_raw as u128, 64),
                reserved_pnl: read_u64(data, b + account::RESERVED_PNL, "account.reserved_pnl")?,
                warmup_started_at_slot: read_u64(
                    data,
                    b + account::WARMUP_STARTED_AT_SLOT,
                    "account.warmup_started_at_slot",
                )?,
                warmup_slope_per_step: read_u128(
                    data,
                    b + account::WARMUP_SLOPE_PER_STEP,
                    "account.warmup_slope_per_step",
                )?,
                position_size: read_i128(data, b + account::POSITION_SIZE, "account.position_size")?,
                entry_price: read_u64(data, b + account::ENTRY_PRICE, "account.entry_price")?,
                funding_index: read_i128(data, b + account::FUNDING_INDEX, "account.funding_index")?,
                matcher_program: read_pubkey(data, b + account::MATCHER_PROGRAM, "account.matcher_program")?,
                matcher_context: read_pubkey(data, b + account::MATCHER_CONTEXT, "account.matcher_context")?,
                fee_credits: read_i128(data, b + account::FEE_CREDITS, "account.fee_credits")?,
                last_fee_slot: read_u64(data, b + account::LAST_FEE_SLOT, "account.last_fee_slot")?,
            })
        }
    }

    impl Default for SlabLayout {
        fn default() -> Self {
            Self::DEFAULT
        }
    }

    pub fn decode_header(data: &[u8]) -> Result<SlabHeader, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(OutOfBounds { field: "header", offset: 0, len: HEADER_LEN, buf_len: data.len() }.into());
        }
        let magic = read_u64(data, header::MAGIC, "header.magic")?;
        if magic != MAGIC {
            return Err(DecodeError::InvalidMagic { found: magic });
        }
        let version = read_u32(data, header::VERSION, "header.version")?;
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion { found: version });
        }
        Ok(SlabHeader {
            magic,
            version,
            bump: read_u8(data, header::BUMP, "header.bump")?,
            flags: read_u8(data, header::FLAGS, "header.flags")?,
            admin: read_pubkey(data, header::ADMIN, "header.admin")?,
            nonce: read_u64(data, header::NONCE, "header.nonce")?,
            last_thr_update_slot: read_u64(data, header::LAST_THR_UPDATE_SLOT, "header.last_thr_update_slot")?,
        })
    }

    pub fn decode_config(data: &[u8]) -> Result<MarketConfig, DecodeError> {
        let b = CONFIG_OFF;
        Ok(MarketConfig {
            collateral_mint: read_pubkey(data, b + config::COLLATERAL_MINT, "config.collateral_mint")?,
            vault_pubkey: read_pubkey(data, b + config::VAULT_PUBKEY, "config.vault_pubkey")?,
            index_feed_id: read_pubkey(data, b + config::INDEX_FEED_ID, "config.index_feed_id")?,
            max_staleness_secs: read_u64(data, b + config::MAX_STALENESS_SECS, "config.max_staleness_secs")?,
            conf_filter_bps: read_u16(data, b + config::CONF_FILTER_BPS, "config.conf_filter_bps")?,
            vault_authority_bump: read_u8(data, b + config::VAULT_AUTHORITY_BUMP, "config.vault_authority_bump")?,
            invert: read_bool(data, b + config::INVERT, "config.invert")?,
            unit_scale: read_u32(data, b + config::UNIT_SCALE, "config.unit_scale")?,
            funding_horizon_slots: read_u64(data, b + config::FUNDING_HORIZON_SLOTS, "config.funding_horizon_slots")?,
            funding_k_bps: read_u64(data, b + config::FUNDING_K_BPS, "config.funding_k_bps")?,
            funding_inv_scale_notional_e6: read_u128(
                data,
                b + config::FUNDING_INV_SCALE_NOTIONAL_E6,
                "config.funding_inv_scale_notional_e6",
            )?,
            funding_max_premium_bps: read_i64(
                data,
                b + config::FUNDING_MAX_PREMIUM_BPS,
                "config.funding_max_premium_bps",
            )?,
            funding_max_bps_per_slot: read_i64(
                data,
                b + config::FUNDING_MAX_BPS_PER_SLOT,
                "config.funding_max_bps_per_slot",
            )?,
            thresh_floor: read_u128(data, b + config::THRESH_FLOOR, "config.thresh_floor")?,
            thresh_risk_bps: read_u64(data, b + config::THRESH_RISK_BPS, "config.thresh_risk_bps")?,
            thresh_update_interval_slots: read_u64(
                data,
                b + config::THRESH_UPDATE_INTERVAL_SLOTS,
                "config.thresh_update_interval_slots",
            )?,
            thresh_step_bps: read_u64(data, b + config::THRESH_STEP_BPS, "config.thresh_step_bps")?,
            thresh_alpha_bps: read_u64(data, b + config::THRESH_ALPHA_BPS, "config.thresh_alpha_bps")?,
            thresh_min: read_u128(data, b + config::THRESH_MIN, "config.thresh_min")?,
            thresh_max: read_u128(data, b + config::THRESH_MAX, "config.thresh_max")?,
            thresh_min_step: read_u128(data, b + config::THRESH_MIN_STEP, "config.thresh_min_step")?,
            oracle_authority: read_pubkey(data, b + config::ORACLE_AUTHORITY, "config.oracle_authority")?,
            authority_price_e6: read_u64(data, b + config::AUTHORITY_PRICE_E6, "config.authority_price_e6")?,
            authority_timestamp: read_i64(data, b + config::AUTHORITY_TIMESTAMP, "config.authority_timestamp")?,
            oracle_price_cap_e2bps: read_u64(
                data,
                b + config::ORACLE_PRICE_CAP_E2BPS,
                "config.oracle_price_cap_e2bps",
            )?,
            last_effective_price_e6: read_u64(
                data,
                b + config::LAST_EFFECTIVE_PRICE_E6,
                "config.last_effective_price_e6",
            )?,
        })
    }

    pub fn decode_params(data: &[u8]) -> Result<RiskParams, DecodeError> {
        let b = ENGINE_OFF + engine::PARAMS;
        Ok(RiskParams {
            warmup_period_slots: read_u64(data, b + params::WARMUP_PERIOD_SLOTS, "params.warmup_period_slots")?,
            maintenance_margin_bps: read_u64(
                data,
                b + params::MAINTENANCE_MARGIN_BPS,
                "params.maintenance_margin_bps",
            )?,
            initial_margin_bps: read_u64(data, b + params::INITIAL_MARGIN_BPS, "params.initial_margin_bps")?,
            trading_fee_bps: read_u64(data, b + params::TRADING_FEE_BPS, "params.trading_fee_bps")?,
            max_accounts: read_u64(data, b + params::MAX_ACCOUNTS, "params.max_accounts")?,
            new_account_fee: read_u128(data, b + params::NEW_ACCOUNT_FEE, "params.new_account_fee")?,
            risk_reduction_threshold: read_u128(
                data,
                b + params::RISK_REDUCTION_THRESHOLD,
                "params.risk_reduction_threshold",
            )?,
            maintenance_fee_per_slot: read_u128(
                data,
                b + params::MAINTENANCE_FEE_PER_SLOT,
                "params.maintenance_fee_per_slot",
            )?,
            max_crank_staleness_slots: read_u64(
                data,
                b + params::MAX_CRANK_STALENESS_SLOTS,
                "params.max_crank_staleness_slots",
            )?,
            liquidation_fee_bps: read_u64(data, b + params::LIQUIDATION_FEE_BPS, "params.liquidation_fee_bps")?,
            liquidation_fee_cap: read_u128(data, b + params::LIQUIDATION_FEE_CAP, "params.liquidation_fee_cap")?,
            liquidation_buffer_bps: read_u64(
                data,
                b + params::LIQUIDATION_BUFFER_BPS,
                "params.liquidation_buffer_bps",
            )?,
            min_liquidation_abs: read_u128(data, b + params::MIN_LIQUIDATION_ABS, "params.min_liquidation_abs")?,
        })
    }

    pub fn decode(data: &[u8]) -> Result<Slab, DecodeError> {
        SlabLayout::DEFAULT.decode(data)
    }

    pub fn decode_used_indices(data: &[u8]) -> Result<Vec<u16>, DecodeError> {
        SlabLayout::DEFAULT.decode_used_indices(data)
    }

    pub fn decode_account_at(data: &[u8], idx: u16) -> Result<Option<Account>, DecodeError> {
        SlabLayout::DEFAULT.decode_account_at(data, idx)
    }

    pub fn decode_all_accounts(data: &[u8]) -> Result<Vec<(u16, Account)>, DecodeError> {
        SlabLayout::DEFAULT.decode_all_accounts(data)
    }

    pub fn find_user_account(data: &[u8], owner: &Pubkey) -> Result<Option<(u16, Account)>, DecodeError> {
        SlabLayout::DEFAULT.find_user_account(data, owner)
    }
}

// 5. mod ix
pub mod ix {
    use crate::accounts::{self, AccountSchema};
    use crate::constants::{CRANK_NO_CALLER, MAX_SLOT_CAPACITY};
    use crate::error::{DecodeError, EncodeError};
    use crate::layout::{ByteWriter, Cursor};
    use crate::state::RiskParams;
    use crate::units::{self, PRICE_DECIMALS};
    use core::num::IntErrorKind;
    use solana_program::pubkey::Pubkey;

    pub mod tags {
        pub const TAG_INIT_MARKET: u8 = 0;
        pub const TAG_INIT_USER: u8 = 1;
        pub const TAG_INIT_LP: u8 = 2;
        pub const TAG_DEPOSIT_COLLATERAL: u8 = 3;
        pub const TAG_WITHDRAW_COLLATERAL: u8 = 4;
        pub const TAG_KEEPER_CRANK: u8 = 5;
        pub const TAG_TRADE_NO_CPI: u8 = 6;
        pub const TAG_LIQUIDATE_AT_ORACLE: u8 = 7;
        pub const TAG_CLOSE_ACCOUNT: u8 = 8;
        pub const TAG_TOP_UP_INSURANCE: u8 = 9;
        pub const TAG_TRADE_CPI: u8 = 10;
        pub const TAG_SET_RISK_THRESHOLD: u8 = 11;
        pub const TAG_UPDATE_ADMIN: u8 = 12;
        pub const TAG_CLOSE_SLAB: u8 = 13;
        pub const TAG_UPDATE_CONFIG: u8 = 14;
        pub const TAG_SET_MAINTENANCE_FEE: u8 = 15;
        pub const TAG_SET_ORACLE_AUTHORITY: u8 = 16;
        pub const TAG_PUSH_ORACLE_PRICE: u8 = 17;
        pub const TAG_SET_ORACLE_PRICE_CAP: u8 = 18;
        pub const TAG_RESOLVE_MARKET: u8 = 19;
        pub const TAG_WITHDRAW_INSURANCE: u8 = 20;
    }

    use tags::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InitMarketArgs {
        pub admin: Pubkey,
        pub collateral_mint: Pubkey,
        pub index_feed_id: [u8; 32],
        pub max_staleness_secs: u64,
        pub conf_filter_bps: u16,
        pub invert: bool,
        pub unit_scale: u32,
        pub initial_mark_price_e6: u64,
        pub risk_params: RiskParams,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct InitUserArgs {
        pub fee_payment: u64,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InitLpArgs {
        pub matcher_program: Pubkey,
        pub matcher_context: Pubkey,
        pub fee_payment: u64,
    }

    /// Deposit or withdraw `amount` (native collateral units) for slot `user_idx`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CollateralArgs {
        pub user_idx: u16,
        pub amount: u64,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct KeeperCrankArgs {
        pub caller_idx: u16,
        pub allow_panic: bool,
    }

    impl KeeperCrankArgs {
        pub const fn permissionless() -> Self {
            Self { caller_idx: CRANK_NO_CALLER, allow_panic: false }
        }
    }

    /// Trade between an LP slot and a user slot. Positive size buys for the user.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TradeArgs {
        pub lp_idx: u16,
        pub user_idx: u16,
        pub size: i128,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LiquidateAtOracleArgs {
        pub target_idx: u16,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CloseAccountArgs {
        pub user_idx: u16,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TopUpInsuranceArgs {
        pub amount: u64,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SetRiskThresholdArgs {
        pub new_threshold: u128,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct UpdateAdminArgs {
        pub new_admin: Pubkey,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct UpdateConfigArgs {
        pub funding_horizon_slots: u64,
        pub funding_k_bps: u64,
        pub funding_inv_scale_notional_e6: u128,
        pub funding_max_premium_bps: i64,
        pub funding_max_bps_per_slot: i64,
        pub thresh_floor: u128,
        pub thresh_risk_bps: u64,
        pub thresh_update_interval_slots: u64,
        pub thresh_step_bps: u64,
        pub thresh_alpha_bps: u64,
        pub thresh_min: u128,
        pub thresh_max: u128,
        pub thresh_min_step: u128,
    }

    impl UpdateConfigArgs {
        /// Current values from a decoded market, for read-modify-write updates.
        pub fn from_config(cfg: &crate::state::MarketConfig) -> Self {
            Self {
                funding_horizon_slots: cfg.funding_horizon_slots,
                funding_k_bps: cfg.funding_k_bps,
                funding_inv_scale_notional_e6: cfg.funding_inv_scale_notional_e6,
                funding_max_premium_bps: cfg.funding_max_premium_bps,
                funding_max_bps_per_slot: cfg.funding_max_bps_per_slot,
                thresh_floor: cfg.thresh_floor,
                thresh_risk_bps: cfg.thresh_risk_bps,
                thresh_update_interval_slots: cfg.thresh_update_interval_slots,
                thresh_step_bps: cfg.thresh_step_bps,
                thresh_alpha_bps: cfg.thresh_alpha_bps,
                thresh_min: cfg.thresh_min,
                thresh_max: cfg.thresh_max,
                thresh_min_step: cfg.thresh_min_step,
            }
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SetMaintenanceFeeArgs {
        pub new_fee: u128,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SetOracleAuthorityArgs {
        pub new_authority: Pubkey,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PushOraclePriceArgs {
        pub price_e6: u64,
        pub timestamp: i64,
    }

    impl PushOraclePriceArgs {
        /// Scale a human price (e.g. `142.5`) to 6 decimals.
        pub fn from_ui_price(price: f64, timestamp: i64) -> Result<Self, EncodeError> {
            let scaled = units::from_ui(price, PRICE_DECIMALS, "price")?;
            let price_e6 = u64::try_from(scaled)
                .map_err(|_| EncodeError::out_of_range("price", price, "0..=u64::MAX e-6"))?;
            Ok(Self { price_e6, timestamp })
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct SetOraclePriceCapArgs {
        pub max_change_e2bps: u64,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Instruction {
        InitMarket(InitMarketArgs),
        InitUser(InitUserArgs),
        InitLp(InitLpArgs),
        DepositCollateral(CollateralArgs),
        WithdrawCollateral(CollateralArgs),
        KeeperCrank(KeeperCrankArgs),
        TradeNoCpi(TradeArgs),
        LiquidateAtOracle(LiquidateAtOracleArgs),
        CloseAccount(CloseAccountArgs),
        TopUpInsurance(TopUpInsuranceArgs),
        TradeCpi(TradeArgs),
        SetRiskThreshold(SetRiskThresholdArgs),
        UpdateAdmin(UpdateAdminArgs),
        CloseSlab,
        UpdateConfig(UpdateConfigArgs),
        SetMaintenanceFee(SetMaintenanceFeeArgs),
        SetOracleAuthority(SetOracleAuthorityArgs),
        PushOraclePrice(PushOraclePriceArgs),
        SetOraclePriceCap(SetOraclePriceCapArgs),
        ResolveMarket,
        WithdrawInsurance,
    }

    impl Instruction {
        pub fn tag(&self) -> u8 {
            match self {
                Instruction::InitMarket(_) => TAG_INIT_MARKET,
                Instruction::InitUser(_) => TAG_INIT_USER,
                Instruction::InitLp(_) => TAG_INIT_LP,
                Instruction::DepositCollateral(_) => TAG_DEPOSIT_COLLATERAL,
                Instruction::WithdrawCollateral(_) => TAG_WITHDRAW_COLLATERAL,
                Instruction::KeeperCrank(_) => TAG_KEEPER_CRANK,
                Instruction::TradeNoCpi(_) => TAG_TRADE_NO_CPI,
                Instruction::LiquidateAtOracle(_) => TAG_LIQUIDATE_AT_ORACLE,
                Instruction::CloseAccount(_) => TAG_CLOSE_ACCOUNT,
                Instruction::TopUpInsurance(_) => TAG_TOP_UP_INSURANCE,
                Instruction::TradeCpi(_) => TAG_TRADE_CPI,
                Instruction::SetRiskThreshold(_) => TAG_SET_RISK_THRESHOLD,
                Instruction::UpdateAdmin(_) => TAG_UPDATE_ADMIN,
                Instruction::CloseSlab => TAG_CLOSE_SLAB,
                Instruction::UpdateConfig(_) => TAG_UPDATE_CONFIG,
                Instruction::SetMaintenanceFee(_) => TAG_SET_MAINTENANCE_FEE,
                Instruction::SetOracleAuthority(_) => TAG_SET_ORACLE_AUTHORITY,
                Instruction::PushOraclePrice(_) => TAG_PUSH_ORACLE_PRICE,
                Instruction::SetOraclePriceCap(_) => TAG_SET_ORACLE_PRICE_CAP,
                Instruction::ResolveMarket => TAG_RESOLVE_MARKET,
                Instruction::WithdrawInsurance => TAG_WITHDRAW_INSURANCE,
            }
        }

        /// Account roles this instruction expects, in order.
        pub fn account_schema(&self) -> &'static AccountSchema {
            match self {
                Instruction::InitMarket(_) => &accounts::INIT_MARKET,
                Instruction::InitUser(_) => &accounts::INIT_USER,
                Instruction::InitLp(_) => &accounts::INIT_LP,
                Instruction::DepositCollateral(_) => &accounts::DEPOSIT_COLLATERAL,
                Instruction::WithdrawCollateral(_) => &accounts::WITHDRAW_COLLATERAL,
                Instruction::KeeperCrank(_) => &accounts::KEEPER_CRANK,
                Instruction::TradeNoCpi(_) => &accounts::TRADE_NO_CPI,
                Instruction::LiquidateAtOracle(_) => &accounts::LIQUIDATE_AT_ORACLE,
                Instruction::CloseAccount(_) => &accounts::CLOSE_ACCOUNT,
                Instruction::TopUpInsurance(_) => &accounts::TOP_UP_INSURANCE,
                Instruction::TradeCpi(_) => &accounts::TRADE_CPI,
                Instruction::SetRiskThreshold(_) => &accounts::SET_RISK_THRESHOLD,
                Instruction::UpdateAdmin(_) => &accounts::UPDATE_ADMIN,
                Instruction::CloseSlab => &accounts::CLOSE_SLAB,
                Instruction::UpdateConfig(_) => &accounts::UPDATE_CONFIG,
                Instruction::SetMaintenanceFee(_) => &accounts::SET_MAINTENANCE_FEE,
                Instruction::SetOracleAuthority(_) => &accounts::SET_ORACLE_AUTHORITY,
                Instruction::PushOraclePrice(_) => &accounts::PUSH_ORACLE_PRICE,
                Instruction::SetOraclePriceCap(_) => &accounts::SET_ORACLE_PRICE_CAP,
                Instruction::ResolveMarket => &accounts::RESOLVE_MARKET,
                Instruction::WithdrawInsurance => &accounts::WITHDRAW_INSURANCE,
            }
        }

        pub fn name(&self) -> &'static str {
            self.account_schema().instruction
        }

        pub fn encode(&self) -> Vec<u8> {
            match self {
                Instruction::InitMarket(a) => encode_init_market(a),
                Instruction::InitUser(a) => encode_init_user(a),
                Instruction::InitLp(a) => encode_init_lp(a),
                Instruction::DepositCollateral(a) => encode_deposit_collateral(a),
                Instruction::WithdrawCollateral(a) => encode_withdraw_collateral(a),
                Instruction::KeeperCrank(a) => encode_keeper_crank(a),
                Instruction::TradeNoCpi(a) => encode_trade_no_cpi(a),
                Instruction::LiquidateAtOracle(a) => encode_liquidate_at_oracle(a),
                Instruction::CloseAccount(a) => encode_close_account(a),
                Instruction::TopUpInsurance(a) => encode_top_up_insurance(a),
                Instruction::TradeCpi(a) => encode_trade_cpi(a),
                Instruction::SetRiskThreshold(a) => encode_set_risk_threshold(a),
                Instruction::UpdateAdmin(a) => encode_update_admin(a),
                Instruction::CloseSlab => encode_close_slab(),
                Instruction::UpdateConfig(a) => encode_update_config(a),
                Instruction::SetMaintenanceFee(a) => encode_set_maintenance_fee(a),
                Instruction::SetOracleAuthority(a) => encode_set_oracle_authority(a),
                Instruction::PushOraclePrice(a) => encode_push_oracle_price(a),
                Instruction::SetOraclePriceCap(a) => encode_set_oracle_price_cap(a),
                Instruction::ResolveMarket => encode_resolve_market(),
                Instruction::WithdrawInsurance => encode_withdraw_insurance(),
            }
        }

        /// Parse a payload the way the program does. Trailing bytes are ignored.
        pub fn decode(input: &[u8]) -> Result<Self, DecodeError> {
            let (&tag, rest) = input.split_first().ok_or(DecodeError::EmptyInstruction)?;
            let mut c = Cursor::new(rest);
            let c = &mut c;

            Ok(match tag {
                TAG_INIT_MARKET => Instruction::InitMarket(InitMarketArgs {
                    admin: c.read_pubkey("admin")?,
                    collateral_mint: c.read_pubkey("collateral_mint")?,
                    index_feed_id: c.read_bytes32("index_feed_id")?,
                    max_staleness_secs: c.read_u64("max_staleness_secs")?,
                    conf_filter_bps: c.read_u16("conf_filter_bps")?,
                    invert: c.read_bool("invert")?,
                    unit_scale: c.read_u32("unit_scale")?,
                    initial_mark_price_e6: c.read_u64("initial_mark_price_e6")?,
                    risk_params: read_risk_params(c)?,
                }),
                TAG_INIT_USER => Instruction::InitUser(InitUserArgs { fee_payment: c.read_u64("fee_payment")? }),
                TAG_INIT_LP => Instruction::InitLp(InitLpArgs {
                    matcher_program: c.read_pubkey("matcher_program")?,
                    matcher_context: c.read_pubkey("matcher_context")?,
                    fee_payment: c.read_u64("fee_payment")?,
                }),
                TAG_DEPOSIT_COLLATERAL => Instruction::DepositCollateral(read_collateral(c)?),
                TAG_WITHDRAW_COLLATERAL => Instruction::WithdrawCollateral(read_collateral(c)?),
                TAG_KEEPER_CRANK => Instruction::KeeperCrank(KeeperCrankArgs {
                    caller_idx: c.read_u16("caller_idx")?,
                    allow_panic: c.read_bool("allow_panic")?,
                }),
                TAG_TRADE_NO_CPI => Instruction::TradeNoCpi(read_trade(c)?),
                TAG_LIQUIDATE_AT_ORACLE => {
                    Instruction::LiquidateAtOracle(LiquidateAtOracleArgs { target_idx: c.read_u16("target_idx")? })
                }
                TAG_CLOSE_ACCOUNT => Instruction::CloseAccount(CloseAccountArgs { user_idx: c.read_u16("user_idx")? }),
                TAG_TOP_UP_INSURANCE => {
                    Instruction::TopUpInsurance(TopUpInsuranceArgs { amount: c.read_u64("amount")? })
                }
                TAG_TRADE_CPI => Instruction::TradeCpi(read_trade(c)?),
                TAG_SET_RISK_THRESHOLD => {
                    Instruction::SetRiskThreshold(SetRiskThresholdArgs { new_threshold: c.read_u128("new_threshold")? })
                }
                TAG_UPDATE_ADMIN => {
                    Instruction::UpdateAdmin(UpdateAdminArgs { new_admin: c.read_pubkey("new_admin")? })
                }
                TAG_CLOSE_SLAB => Instruction::CloseSlab,
                TAG_UPDATE_CONFIG => Instruction::UpdateConfig(UpdateConfigArgs {
                    funding_horizon_slots: c.read_u64("funding_horizon_slots")?,
                    funding_k_bps: c.read_u64("funding_k_bps")?,
                    funding_inv_scale_notional_e6: c.read_u128("funding_inv_scale_notional_e6")?,
                    funding_max_premium_bps: c.read_i64("funding_max_premium_bps")?,
                    funding_max_bps_per_slot: c.read_i64("funding_max_bps_per_slot")?,
                    thresh_floor: c.read_u128("thresh_floor")?,
                    thresh_risk_bps: c.read_u64("thresh_risk_bps")?,
                    thresh_update_interval_slots: c.read_u64("thresh_update_interval_slots")?,
                    thresh_step_bps: c.read_u64("thresh_step_bps")?,
                    thresh_alpha_bps: c.read_u64("thresh_alpha_bps")?,
                    thresh_min: c.read_u128("thresh_min")?,
                    thresh_max: c.read_u128("thresh_max")?,
                    thresh_min_step: c.read_u128("thresh_min_step")?,
                }),
                TAG_SET_MAINTENANCE_FEE => {
                    Instruction::SetMaintenanceFee(SetMaintenanceFeeArgs { new_fee: c.read_u128("new_fee")? })
                }
                TAG_SET_ORACLE_AUTHORITY => Instruction::SetOracleAuthority(SetOracleAuthorityArgs {
                    new_authority: c.read_pubkey("new_authority")?,
                }),
                TAG_PUSH_ORACLE_PRICE => Instruction::PushOraclePrice(PushOraclePriceArgs {
                    price_e6: c.read_u64("price_e6")?,
                    timestamp: c.read_i64("timestamp")?,
                }),
                TAG_SET_ORACLE_PRICE_CAP => Instruction::SetOraclePriceCap(SetOraclePriceCapArgs {
                    max_change_e2bps: c.read_u64("max_change_e2bps")?,
                }),
                TAG_RESOLVE_MARKET => Instruction::ResolveMarket,
                TAG_WITHDRAW_INSURANCE => Instruction::WithdrawInsurance,
                _ => return Err(DecodeError::UnknownInstruction(tag)),
            })
        }
    }

    fn read_collateral(c: &mut Cursor) -> Result<CollateralArgs, DecodeError> {
        Ok(CollateralArgs { user_idx: c.read_u16("user_idx")?, amount: c.read_u64("amount")? })
    }

    fn read_trade(c: &mut Cursor) -> Result<TradeArgs, DecodeError> {
        Ok(TradeArgs { lp_idx: c.read_u16("lp_idx")?, user_idx: c.read_u16("user_idx")?, size: c.read_i128("size")? })
    }

    fn read_risk_params(c: &mut Cursor) -> Result<RiskParams, DecodeError> {
        Ok(RiskParams {
            warmup_period_slots: c.read_u64("warmup_period_slots")?,
            maintenance_margin_bps: c.read_u64("maintenance_margin_bps")?,
            initial_margin_bps: c.read_u64("initial_margin_bps")?,
            trading_fee_bps: c.read_u64("trading_fee_bps")?,
            max_accounts: c.read_u64("max_accounts")?,
            new_account_fee: c.read_u128("new_account_fee")?,
            risk_reduction_threshold: c.read_u128("risk_reduction_threshold")?,
            maintenance_fee_per_slot: c.read_u128("maintenance_fee_per_slot")?,
            max_crank_staleness_slots: c.read_u64("max_crank_staleness_slots")?,
            liquidation_fee_bps: c.read_u64("liquidation_fee_bps")?,
            liquidation_fee_cap: c.read_u128("liquidation_fee_cap")?,
            liquidation_buffer_bps: c.read_u64("liquidation_buffer_bps")?,
            min_liquidation_abs: c.read_u128("min_liquidation_abs")?,
        })
    }

    fn put_risk_params(w: &mut ByteWriter, p: &RiskParams) {
        w.put_u64(p.warmup_period_slots)
            .put_u64(p.maintenance_margin_bps)
            .put_u64(p.initial_margin_bps)
            .put_u64(p.trading_fee_bps)
            .put_u64(p.max_accounts)
            .put_u128(p.new_account_fee)
            .put_u128(p.risk_reduction_threshold)
            .put_u128(p.maintenance_fee_per_slot)
            .put_u64(p.max_crank_staleness_slots)
            .put_u64(p.liquidation_fee_bps)
            .put_u128(p.liquidation_fee_cap)
            .put_u64(p.liquidation_buffer_bps)
            .put_u128(p.min_liquidation_abs);
    }

    fn tag_only(tag: u8) -> Vec<u8> {
        ByteWriter::with_tag(tag).into_inner()
    }

    pub fn encode_init_market(a: &InitMarketArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_INIT_MARKET);
        w.put_pubkey(&a.admin)
            .put_pubkey(&a.collateral_mint)
            .put_bytes32(&a.index_feed_id)
            .put_u64(a.max_staleness_secs)
            .put_u16(a.conf_filter_bps)
            .put_bool(a.invert)
            .put_u32(a.unit_scale)
            .put_u64(a.initial_mark_price_e6);
        put_risk_params(&mut w, &a.risk_params);
        w.into_inner()
    }

    pub fn encode_init_user(a: &InitUserArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_INIT_USER);
        w.put_u64(a.fee_payment);
        w.into_inner()
    }

    pub fn encode_init_lp(a: &InitLpArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_INIT_LP);
        w.put_pubkey(&a.matcher_program).put_pubkey(&a.matcher_context).put_u64(a.fee_payment);
        w.into_inner()
    }

    fn encode_collateral(tag: u8, a: &CollateralArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(tag);
        w.put_u16(a.user_idx).put_u64(a.amount);
        w.into_inner()
    }

    pub fn encode_deposit_collateral(a: &CollateralArgs) -> Vec<u8> {
        encode_collateral(TAG_DEPOSIT_COLLATERAL, a)
    }

    pub fn encode_withdraw_collateral(a: &CollateralArgs) -> Vec<u8> {
        encode_collateral(TAG_WITHDRAW_COLLATERAL, a)
    }

    pub fn encode_keeper_crank(a: &KeeperCrankArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_KEEPER_CRANK);
        w.put_u16(a.caller_idx).put_bool(a.allow_panic);
        w.into_inner()
    }

    fn encode_trade(tag: u8, a: &TradeArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(tag);
        w.put_u16(a.lp_idx).put_u16(a.user_idx).put_i128(a.size);
        w.into_inner()
    }

    pub fn encode_trade_no_cpi(a: &TradeArgs) -> Vec<u8> {
        encode_trade(TAG_TRADE_NO_CPI, a)
    }

    pub fn encode_trade_cpi(a: &TradeArgs) -> Vec<u8> {
        encode_trade(TAG_TRADE_CPI, a)
    }

    pub fn encode_liquidate_at_oracle(a: &LiquidateAtOracleArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_LIQUIDATE_AT_ORACLE);
        w.put_u16(a.target_idx);
        w.into_inner()
    }

    pub fn encode_close_account(a: &CloseAccountArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_CLOSE_ACCOUNT);
        w.put_u16(a.user_idx);
        w.into_inner()
    }

    pub fn encode_top_up_insurance(a: &TopUpInsuranceArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_TOP_UP_INSURANCE);
        w.put_u64(a.amount);
        w.into_inner()
    }

    pub fn encode_set_risk_threshold(a: &SetRiskThresholdArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_SET_RISK_THRESHOLD);
        w.put_u128(a.new_threshold);
        w.into_inner()
    }

    pub fn encode_update_admin(a: &UpdateAdminArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_UPDATE_ADMIN);
        w.put_pubkey(&a.new_admin);
        w.into_inner()
    }

    pub fn encode_close_slab() -> Vec<u8> {
        tag_only(TAG_CLOSE_SLAB)
    }

    pub fn encode_update_config(a: &UpdateConfigArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_UPDATE_CONFIG);
        w.put_u64(a.funding_horizon_slots)
            .put_u64(a.funding_k_bps)
            .put_u128(a.funding_inv_scale_notional_e6)
            .put_i64(a.funding_max_premium_bps)
            .put_i64(a.funding_max_bps_per_slot)
            .put_u128(a.thresh_floor)
            .put_u64(a.thresh_risk_bps)
            .put_u64(a.thresh_update_interval_slots)
            .put_u64(a.thresh_step_bps)
            .put_u64(a.thresh_alpha_bps)
            .put_u128(a.thresh_min)
            .put_u128(a.thresh_max)
            .put_u128(a.thresh_min_step);
        w.into_inner()
    }

    pub fn encode_set_maintenance_fee(a: &SetMaintenanceFeeArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_SET_MAINTENANCE_FEE);
        w.put_u128(a.new_fee);
        w.into_inner()
    }

    pub fn encode_set_oracle_authority(a: &SetOracleAuthorityArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_SET_ORACLE_AUTHORITY);
        w.put_pubkey(&a.new_authority);
        w.into_inner()
    }

    pub fn encode_push_oracle_price(a: &PushOraclePriceArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_PUSH_ORACLE_PRICE);
        w.put_u64(a.price_e6).put_i64(a.timestamp);
        w.into_inner()
    }

    pub fn encode_set_oracle_price_cap(a: &SetOraclePriceCapArgs) -> Vec<u8> {
        let mut w = ByteWriter::with_tag(TAG_SET_ORACLE_PRICE_CAP);
        w.put_u64(a.max_change_e2bps);
        w.into_inner()
    }

    pub fn encode_resolve_market() -> Vec<u8> {
        tag_only(TAG_RESOLVE_MARKET)
    }

    pub fn encode_withdraw_insurance() -> Vec<u8> {
        tag_only(TAG_WITHDRAW_INSURANCE)
    }

    // Validation for values arriving as text or wider integers.

    fn classify(field: &'static str, value: &str, range: &'static str, kind: &IntErrorKind) -> EncodeError {
        match kind {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => EncodeError::out_of_range(field, value, range),
            _ => EncodeError::out_of_range(field, format!("{value:?} (not an integer)"), range),
        }
    }

    /// Slot index in `0..=65534`.
    pub fn checked_index(idx: usize, field: &'static str) -> Result<u16, EncodeError> {
        if idx >= MAX_SLOT_CAPACITY {
            return Err(EncodeError::index(field, idx));
        }
        Ok(idx as u16)
    }

    pub fn parse_index(value: &str, field: &'static str) -> Result<u16, EncodeError> {
        let idx = value.trim().parse::<usize>().map_err(|e| EncodeError::index(field, format!("{value:?} ({e})")))?;
        checked_index(idx, field)
    }

    pub fn parse_u64(value: &str, field: &'static str) -> Result<u64, EncodeError> {
        value.trim().parse::<u64>().map_err(|e| classify(field, value, "0..=u64::MAX", e.kind()))
    }

    pub fn parse_i128(value: &str, field: &'static str) -> Result<i128, EncodeError> {
        value.trim().parse::<i128>().map_err(|e| classify(field, value, "i128", e.kind()))
    }
}

// 6. mod accounts
pub mod accounts {
    use crate::error::SchemaMismatchError;
    use solana_program::{instruction::AccountMeta, pubkey::Pubkey};

    /// One account role in an instruction's account list.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AccountSpec {
        pub name: &'static str,
        pub signer: bool,
        pub writable: bool,
    }

    const fn signer(name: &'static str) -> AccountSpec {
        AccountSpec { name, signer: true, writable: true }
    }

    const fn writable(name: &'static str) -> AccountSpec {
        AccountSpec { name, signer: false, writable: true }
    }

    const fn readonly(name: &'static str) -> AccountSpec {
        AccountSpec { name, signer: false, writable: false }
    }

    /// Ordered account roles for one instruction.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct AccountSchema {
        pub instruction: &'static str,
        pub accounts: &'static [AccountSpec],
    }

    impl AccountSchema {
        pub const fn len(&self) -> usize {
            self.accounts.len()
        }

        pub const fn is_empty(&self) -> bool {
            self.accounts.is_empty()
        }

        /// Position of the role called `name`.
        pub fn position(&self, name: &str) -> Option<usize> {
            self.accounts.iter().position(|a| a.name == name)
        }
    }

    const TOKEN_TRANSFER_IN: &[AccountSpec] =
        &[signer("user"), writable("slab"), writable("userAta"), writable("vault"), readonly("tokenProgram")];

    const TOKEN_TRANSFER_OUT: &[AccountSpec] = &[
        signer("user"),
        writable("slab"),
        writable("vault"),
        writable("userAta"),
        readonly("vaultPda"),
        readonly("tokenProgram"),
        readonly("clock"),
        readonly("oracleIdx"),
    ];

    const ADMIN_ONLY: &[AccountSpec] = &[signer("admin"), writable("slab")];

    pub const INIT_MARKET: AccountSchema = AccountSchema {
        instruction: "InitMarket",
        accounts: &[
            signer("admin"),
            writable("slab"),
            readonly("mint"),
            writable("vault"),
            readonly("tokenProgram"),
            readonly("clock"),
            readonly("rent"),
            readonly("dummyAta"),
            readonly("systemProgram"),
        ],
    };

    pub const INIT_USER: AccountSchema = AccountSchema { instruction: "InitUser", accounts: TOKEN_TRANSFER_IN };
    pub const INIT_LP: AccountSchema = AccountSchema { instruction: "InitLP", accounts: TOKEN_TRANSFER_IN };
    pub const TOP_UP_INSURANCE: AccountSchema =
        AccountSchema { instruction: "TopUpInsurance", accounts: TOKEN_TRANSFER_IN };

    pub const DEPOSIT_COLLATERAL: AccountSchema = AccountSchema {
        instruction: "DepositCollateral",
        accounts: &[
            signer("user"),
            writable("slab"),
            writable("userAta"),
            writable("vault"),
            readonly("tokenProgram"),
            readonly("clock"),
        ],
    };

    pub const WITHDRAW_COLLATERAL: AccountSchema =
        AccountSchema { instruction: "WithdrawCollateral", accounts: TOKEN_TRANSFER_OUT };
    pub const CLOSE_ACCOUNT: AccountSchema =
        AccountSchema { instruction: "CloseAccount", accounts: TOKEN_TRANSFER_OUT };

    pub const KEEPER_CRANK: AccountSchema = AccountSchema {
        instruction: "KeeperCrank",
        accounts: &[signer("caller"), writable("slab"), readonly("clock"), readonly("oracle")],
    };

    pub const TRADE_NO_CPI: AccountSchema = AccountSchema {
        instruction: "TradeNoCpi",
        accounts: &[signer("user"), signer("lp"), writable("slab"), readonly("clock"), readonly("oracle")],
    };

    pub const LIQUIDATE_AT_ORACLE: AccountSchema = AccountSchema {
        instruction: "LiquidateAtOracle",
        accounts: &[readonly("unused"), writable("slab"), readonly("clock"), readonly("oracle")],
    };

    pub const TRADE_CPI: AccountSchema = AccountSchema {
        instruction: "TradeCpi",
        accounts: &[
            signer("user"),
            readonly("lpOwner"),
            writable("slab"),
            readonly("clock"),
            readonly("oracle"),
            readonly("matcherProg"),
            writable("matcherCtx"),
            readonly("lpPda"),
        ],
    };

    pub const SET_RISK_THRESHOLD: AccountSchema =
        AccountSchema { instruction: "SetRiskThreshold", accounts: ADMIN_ONLY };
    pub const UPDATE_ADMIN: AccountSchema = AccountSchema { instruction: "UpdateAdmin", accounts: ADMIN_ONLY };
    pub const CLOSE_SLAB: AccountSchema = AccountSchema { instruction: "CloseSlab", accounts: ADMIN_ONLY };
    pub const UPDATE_CONFIG: AccountSchema = AccountSchema { instruction: "UpdateConfig", accounts: ADMIN_ONLY };
    pub const SET_MAINTENANCE_FEE: AccountSchema =
        AccountSchema { instruction: "SetMaintenanceFee", accounts: ADMIN_ONLY };
    pub const SET_ORACLE_AUTHORITY: AccountSchema =
        AccountSchema { instruction: "SetOracleAuthority", accounts: ADMIN_ONLY };
    pub const SET_ORACLE_PRICE_CAP: AccountSchema =
        AccountSchema { instruction: "SetOraclePriceCap", accounts: ADMIN_ONLY };
    pub const RESOLVE_MARKET: AccountSchema = AccountSchema { instruction: "ResolveMarket", accounts: ADMIN_ONLY };

    pub const PUSH_ORACLE_PRICE: AccountSchema = AccountSchema {
        instruction: "PushOraclePrice",
        accounts: &[signer("authority"), writable("slab")],
    };

    pub const WITHDRAW_INSURANCE: AccountSchema = AccountSchema {
        instruction: "WithdrawInsurance",
        accounts: &[
            signer("admin"),
            writable("slab"),
            writable("adminAta"),
            writable("vault"),
            readonly("tokenProgram"),
            readonly("vaultPda"),
        ],
    };

    /// Zip `keys` onto the schema's roles. The count must match exactly.
    pub fn build_account_metas(
        schema: &AccountSchema,
        keys: &[Pubkey],
    ) -> Result<Vec<AccountMeta>, SchemaMismatchError> {
        if keys.len() != schema.len() {
            return Err(SchemaMismatchError {
                instruction: schema.instruction,
                expected: schema.len(),
                got: keys.len(),
            });
        }
        Ok(schema
            .accounts
            .iter()
            .zip(keys)
            .map(|(role, key)| AccountMeta { pubkey: *key, is_signer: role.signer, is_writable: role.writable })
            .collect())
    }

    pub mod well_known {
        use solana_program::{pubkey, pubkey::Pubkey, system_program, sysvar};

        pub const TOKEN_PROGRAM: Pubkey = spl_token::ID;
        pub const ASSOCIATED_TOKEN_PROGRAM: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
        pub const CLOCK: Pubkey = sysvar::clock::ID;
        pub const RENT: Pubkey = sysvar::rent::ID;
        pub const SYSTEM_PROGRAM: Pubkey = system_program::ID;
        pub const COMPUTE_BUDGET_PROGRAM: Pubkey = pubkey!("ComputeBudget111111111111111111111111111111");
    }

    pub fn derive_vault_authority(program_id: &Pubkey, slab_key: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[b"vault", slab_key.as_ref()], program_id)
    }

    /// PDA that signs for LP `lp_idx` when trading through a matcher.
    pub fn derive_lp_pda(program_id: &Pubkey, slab_key: &Pubkey, lp_idx: u16) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[b"lp", slab_key.as_ref(), &lp_idx.to_le_bytes()], program_id)
    }

    pub fn derive_associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(
            &[wallet.as_ref(), well_known::TOKEN_PROGRAM.as_ref(), mint.as_ref()],
            &well_known::ASSOCIATED_TOKEN_PROGRAM,
        )
        .0
    }
}

// 7. mod units
pub mod units {
    //! Fixed-point scaling. Decimals are fixed by field identity, never carried on the wire.

    use crate::error::EncodeError;

    /// Capital, vault, PnL and position sizes.
    pub const COLLATERAL_DECIMALS: u32 = 9;
    /// Prices (`*_e6` fields).
    pub const PRICE_DECIMALS: u32 = 6;
    pub const BPS_PER_PERCENT: u64 = 100;

    fn scale(decimals: u32) -> u128 {
        10u128.checked_pow(decimals).unwrap_or(u128::MAX)
    }

    pub fn amount_to_ui(amount: u128, decimals: u32) -> f64 {
        let s = scale(decimals);
        (amount / s) as f64 + (amount % s) as f64 / s as f64
    }

    pub fn signed_to_ui(amount: i128, decimals: u32) -> f64 {
        let magnitude = amount_to_ui(amount.unsigned_abs(), decimals);
        if amount < 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Human value to native units, rounded to nearest.
    pub fn from_ui(value: f64, decimals: u32, field: &'static str) -> Result<i128, EncodeError> {
        let scaled = (value * 10f64.powi(decimals as i32)).round();
        if !scaled.is_finite() || scaled >= i128::MAX as f64 || scaled <= i128::MIN as f64 {
            return Err(EncodeError::out_of_range(field, value, "finite i128 after scaling"));
        }
        Ok(scaled as i128)
    }

    fn group_thousands(whole: u128) -> String {
        let digits = whole.to_string();
        let mut out = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(',');
            }
            out.push(ch);
        }
        out
    }

    /// `1234567890000, 9, 4` -> `"1,234.5678"`. Fraction digits are truncated and
    /// trailing zeros dropped.
    pub fn format_token_amount(amount: i128, decimals: u32, display_decimals: u32) -> String {
        let s = scale(decimals);
        let abs = amount.unsigned_abs();
        let whole = group_thousands(abs / s);
        let sign = if amount < 0 { "-" } else { "" };

        let shown = display_decimals.min(decimals);
        let frac = (abs % s) / scale(decimals - shown);
        let frac = format!("{:0width$}", frac, width = shown as usize);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            format!("{sign}{whole}")
        } else {
            format!("{sign}{whole}.{frac}")
        }
    }

    /// `142_500_000` -> `"142.50"`.
    pub fn format_price_e6(price_e6: u64) -> String {
        format!("{:.2}", amount_to_ui(price_e6 as u128, PRICE_DECIMALS))
    }

    /// `50` -> `"0.50%"`.
    pub fn bps_to_percent(bps: u64) -> String {
        format!("{:.2}%", bps as f64 / BPS_PER_PERCENT as f64)
    }
}

// 8. mod client
pub mod client {
    //! Complete program instructions built against a fetched market.

    use crate::accounts::{
        build_account_metas, derive_associated_token_address, derive_lp_pda, derive_vault_authority, well_known,
    };
    use crate::constants::CRANK_NO_CALLER;
    use crate::error::{BoxError, ClientError, ProgramExecutionError};
    use crate::ix::{
        self, CloseAccountArgs, CollateralArgs, InitUserArgs, KeeperCrankArgs, LiquidateAtOracleArgs, TradeArgs,
    };
    use crate::layout::ByteWriter;
    use crate::state::{Account, Slab, SlabLayout};
    use solana_program::{instruction::Instruction as TxInstruction, pubkey::Pubkey};

    const COMPUTE_BUDGET_SET_UNIT_LIMIT: u8 = 2;

    /// Fetch raw account data.
    pub trait AccountFetcher {
        fn fetch_bytes(&self, address: &Pubkey) -> Result<Vec<u8>, BoxError>;
    }

    /// Raw result of sending a signed transaction.
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct SubmitOutcome {
        pub signature: String,
        pub slot: u64,
        /// Execution error as reported by the node, if any.
        pub err: Option<String>,
        pub logs: Vec<String>,
    }

    /// Send signed transaction bytes.
    pub trait TransactionSubmitter {
        fn submit(&self, signed_tx: &[u8]) -> Result<SubmitOutcome, BoxError>;
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct TxReceipt {
        pub signature: String,
        pub slot: u64,
        pub logs: Vec<String>,
    }

    /// `SetComputeUnitLimit` for the compute budget program.
    pub fn compute_unit_limit(units: u32) -> TxInstruction {
        let mut w = ByteWriter::with_tag(COMPUTE_BUDGET_SET_UNIT_LIMIT);
        w.put_u32(units);
        TxInstruction { program_id: well_known::COMPUTE_BUDGET_PROGRAM, accounts: Vec::new(), data: w.into_inner() }
    }

    /// Success, or a translated program failure.
    pub fn interpret_outcome(outcome: SubmitOutcome) -> Result<TxReceipt, ProgramExecutionError> {
        match outcome.err {
            None => Ok(TxReceipt { signature: outcome.signature, slot: outcome.slot, logs: outcome.logs }),
            Some(message) => Err(ProgramExecutionError::from_failure(message, outcome.logs)),
        }
    }

    /// A fetched market: decoded state plus the raw bytes for account lookups.
    #[derive(Clone, Debug)]
    pub struct Market {
        pub address: Pubkey,
        pub slab: Slab,
        data: Vec<u8>,
        layout: SlabLayout,
    }

    impl Market {
        pub fn data(&self) -> &[u8] {
            &self.data
        }

        pub fn account(&self, idx: u16) -> Result<Option<Account>, ClientError> {
            Ok(self.layout.decode_account_at(&self.data, idx)?)
        }

        pub fn accounts(&self) -> Result<Vec<(u16, Account)>, ClientError> {
            Ok(self.layout.decode_all_accounts(&self.data)?)
        }

        pub fn find_user_account(&self, owner: &Pubkey) -> Result<Option<(u16, Account)>, ClientError> {
            Ok(self.layout.find_user_account(&self.data, owner)?)
        }
    }

    pub struct MarketClient<F> {
        program_id: Pubkey,
        layout: SlabLayout,
        fetcher: F,
    }

    impl<F: AccountFetcher> MarketClient<F> {
        pub fn new(program_id: Pubkey, fetcher: F) -> Self {
            Self { program_id, layout: SlabLayout::DEFAULT, fetcher }
        }

        pub fn with_layout(mut self, layout: SlabLayout) -> Self {
            self.layout = layout;
            self
        }

        pub fn program_id(&self) -> &Pubkey {
            &self.program_id
        }

        pub fn load_market(&self, address: &Pubkey) -> Result<Market, ClientError> {
            let data = self
                .fetcher
                .fetch_bytes(address)
                .map_err(|source| ClientError::Fetch { address: *address, source })?;
            let slab = self.layout.decode(&data)?;
            Ok(Market { address: *address, slab, data, layout: self.layout })
        }

        fn instruction(&self, ix: &ix::Instruction, keys: &[Pubkey]) -> Result<TxInstruction, ClientError> {
            let accounts = build_account_metas(ix.account_schema(), keys)?;
            let data = ix.encode();
            log::debug!("built {} ({} accounts, {} data bytes)", ix.name(), accounts.len(), data.len());
            Ok(TxInstruction { program_id: self.program_id, accounts, data })
        }

        pub fn init_user(
            &self,
            market: &Market,
            wallet: &Pubkey,
            fee_payment: u64,
        ) -> Result<TxInstruction, ClientError> {
            let user_ata = derive_associated_token_address(wallet, &market.slab.config.collateral_mint);
            self.instruction(
                &ix::Instruction::InitUser(InitUserArgs { fee_payment }),
                &[*wallet, market.address, user_ata, market.slab.config.vault_pubkey, well_known::TOKEN_PROGRAM],
            )
        }

        pub fn deposit(
            &self,
            market: &Market,
            wallet: &Pubkey,
            user_idx: u16,
            amount: u64,
        ) -> Result<TxInstruction, ClientError> {
            let user_ata = derive_associated_token_address(wallet, &market.slab.config.collateral_mint);
            self.instruction(
                &ix::Instruction::DepositCollateral(CollateralArgs { user_idx, amount }),
                &[
                    *wallet,
                    market.address,
                    user_ata,
                    market.slab.config.vault_pubkey,
                    well_known::TOKEN_PROGRAM,
                    well_known::CLOCK,
                ],
            )
        }

        pub fn withdraw(
            &self,
            market: &Market,
            wallet: &Pubkey,
            user_idx: u16,
            amount: u64,
        ) -> Result<TxInstruction, ClientError> {
            let keys = self.transfer_out_keys(market, wallet);
            self.instruction(&ix::Instruction::WithdrawCollateral(CollateralArgs { user_idx, amount }), &keys)
        }

        /// Permissionless crank against the market's oracle.
        ///
        /// With a nonzero `compute_units`, a compute-unit limit instruction is placed first.
        pub fn crank(
            &self,
            market: &Market,
            payer: &Pubkey,
            compute_units: Option<u32>,
        ) -> Result<Vec<TxInstruction>, ClientError> {
            let crank = self.instruction(
                &ix::Instruction::KeeperCrank(KeeperCrankArgs { caller_idx: CRANK_NO_CALLER, allow_panic: false }),
                &[*payer, market.address, well_known::CLOCK, market.slab.config.index_feed_id],
            )?;
            Ok(compute_units.filter(|&units| units > 0).map(compute_unit_limit).into_iter().chain([crank]).collect())
        }

        /// Trade against LP `lp_idx` through its registered matcher.
        pub fn trade_cpi(
            &self,
            market: &Market,
            wallet: &Pubkey,
            lp_idx: u16,
            user_idx: u16,
            size: i128,
        ) -> Result<TxInstruction, ClientError> {
            let lp = market
                .account(lp_idx)?
                .filter(Account::is_lp)
                .ok_or_else(|| ClientError::Rejected(format!("slot {lp_idx} is not an LP account")))?;
            let (lp_pda, _) = derive_lp_pda(&self.program_id, &market.address, lp_idx);
            self.instruction(
                &ix::Instruction::TradeCpi(TradeArgs { lp_idx, user_idx, size }),
                &[
                    *wallet,
                    lp.owner,
                    market.address,
                    well_known::CLOCK,
                    market.slab.config.index_feed_id,
                    lp.matcher_program,
                    lp.matcher_context,
                    lp_pda,
                ],
            )
        }

        /// Close the wallet's user account. Refused while a position is open.
        pub fn close_account(
            &self,
            market: &Market,
            wallet: &Pubkey,
            user_idx: u16,
        ) -> Result<TxInstruction, ClientError> {
            let acct = market
                .account(user_idx)?
                .ok_or_else(|| ClientError::Rejected(format!("slot {user_idx} is free")))?;
            if !acct.is_user() {
                return Err(ClientError::Rejected(format!("slot {user_idx} is an LP account")));
            }
            if acct.owner != *wallet {
                return Err(ClientError::Rejected(format!("slot {user_idx} is owned by {}, not {wallet}", acct.owner)));
            }
            if acct.has_position() {
                return Err(ClientError::Rejected(format!(
                    "slot {user_idx} still holds a position of {}; close it first",
                    acct.position_size
                )));
            }
            let keys = self.transfer_out_keys(market, wallet);
            self.instruction(&ix::Instruction::CloseAccount(CloseAccountArgs { user_idx }), &keys)
        }

        /// Liquidate `target_idx` at the oracle price. The target must be a used slot.
        pub fn liquidate(
            &self,
            market: &Market,
            payer: &Pubkey,
            target_idx: u16,
        ) -> Result<TxInstruction, ClientError> {
            if market.account(target_idx)?.is_none() {
                return Err(ClientError::Rejected(format!("slot {target_idx} is free")));
            }
            self.instruction(
                &ix::Instruction::LiquidateAtOracle(LiquidateAtOracleArgs { target_idx }),
                &[*payer, market.address, well_known::CLOCK, market.slab.config.index_feed_id],
            )
        }

        pub fn submit<S: TransactionSubmitter>(
            &self,
            submitter: &S,
            signed_tx: &[u8],
        ) -> Result<TxReceipt, ClientError> {
            let outcome = submitter.submit(signed_tx).map_err(ClientError::Submit)?;
            let receipt = interpret_outcome(outcome)?;
            log::debug!("confirmed {} at slot {}", receipt.signature, receipt.slot);
            Ok(receipt)
        }

        fn transfer_out_keys(&self, market: &Market, wallet: &Pubkey) -> [Pubkey; 8] {
            let cfg = &market.slab.config;
            let (vault_pda, _) = derive_vault_authority(&self.program_id, &market.address);
            [
                *wallet,
                market.address,
                cfg.vault_pubkey,
                derive_associated_token_address(wallet, &cfg.collateral_mint),
                vault_pda,
                well_known::TOKEN_PROGRAM,
                well_known::CLOCK,
                cfg.index_feed_id,
            ]
        }
    }
}

pub use accounts::{build_account_metas, AccountSchema, AccountSpec};
pub use error::{ClientError, DecodeError, EncodeError, PercolatorError, ProgramExecutionError, SchemaMismatchError};
pub use state::{decode, decode_account_at, decode_all_accounts, decode_used_indices, find_user_account, SlabLayout};
