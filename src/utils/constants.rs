//! Protocol constants and default parameters.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.
//! Fixed-point values are 18-decimal wads expressed as raw `u128`.

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Decimals of every amount, price and ratio
pub const DECIMALS: u32 = 18;

/// One whole unit (1.0) as a raw wad
pub const UNIT_RAW: u128 = 1_000_000_000_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// DEFAULT DOMAIN PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Build (issuance) ratio - 0.2 debt per unit of collateral value (500% C-ratio)
pub const DEFAULT_BUILD_RATIO: u128 = UNIT_RAW / 5;

/// Liquidation ratio - 0.5 debt per unit of collateral value (200% C-ratio)
pub const DEFAULT_LIQUIDATION_RATIO: u128 = UNIT_RAW / 2;

/// Marker reward - 5% of the liquidated principal
pub const DEFAULT_MARKER_REWARD_RATIO: u128 = UNIT_RAW / 20;

/// Liquidator reward - 10% of the liquidated principal
pub const DEFAULT_LIQUIDATOR_REWARD_RATIO: u128 = UNIT_RAW / 10;

/// Delay between marking a position and liquidating it - 3 days
pub const DEFAULT_LIQUIDATION_DELAY_SECS: u64 = 3 * 24 * 60 * 60;

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum price age before it is considered stale - 12 hours
pub const DEFAULT_PRICE_STALE_PERIOD_SECS: u64 = 12 * 60 * 60;

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD LOCKER
// ═══════════════════════════════════════════════════════════════════════════════

/// Bit width of a reward entry amount
pub const REWARD_AMOUNT_BITS: usize = 216;

/// Bit width of a reward entry unlock time
pub const UNLOCK_TIME_BITS: u32 = 40;

/// Largest unlock time a reward entry can carry
pub const MAX_UNLOCK_TIME: u64 = (1u64 << UNLOCK_TIME_BITS) - 1;

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD SYSTEM
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of a reward period - 1 week
pub const DEFAULT_REWARD_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;

/// Periods after its own end during which a reward can still be claimed
pub const DEFAULT_CLAIM_WINDOW_PERIODS: u64 = 2;

/// Lock applied to claimed staking rewards, counted from the period end - 52 weeks
pub const DEFAULT_STAKING_REWARD_LOCK_SECS: u64 = 52 * DEFAULT_REWARD_PERIOD_SECS;

/// Domain tag of signed reward claims
pub const REWARD_CLAIM_TAG: &str = "Athos:RewardClaim:v1";

// ═══════════════════════════════════════════════════════════════════════════════
// CRYPTOGRAPHY
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of a hash in bytes
pub const HASH_LENGTH: usize = 32;

/// Length of a compressed public key in bytes
pub const PUBKEY_LENGTH: usize = 33;

/// Length of a compact signature in bytes
pub const SIGNATURE_LENGTH: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of an account identifier in bytes
pub const ACCOUNT_LENGTH: usize = 20;

/// Maximum length of a currency symbol in bytes
pub const MAX_CURRENCY_KEY_LENGTH: usize = 32;

/// Identity of the mint/burn gateway component
pub const BUILD_BURN_COMPONENT: [u8; ACCOUNT_LENGTH] = [0xb0; ACCOUNT_LENGTH];

/// Identity of the liquidation component
pub const LIQUIDATION_COMPONENT: [u8; ACCOUNT_LENGTH] = [0x1c; ACCOUNT_LENGTH];

/// Identity of the reward system component
pub const REWARD_SYSTEM_COMPONENT: [u8; ACCOUNT_LENGTH] = [0x5e; ACCOUNT_LENGTH];

/// Native collateral currency symbol
pub const NATIVE_CURRENCY: &str = "ATH";

/// Environment variable overriding the price stale period
pub const ENV_PRICE_STALE_PERIOD: &str = "ATHOS_PRICE_STALE_PERIOD";

/// Environment variable overriding the native currency
pub const ENV_NATIVE_CURRENCY: &str = "ATHOS_NATIVE_CURRENCY";
