pub mod donki;

pub use donki::{DEFAULT_DONKI_FLR_URL, DonkiClient};
