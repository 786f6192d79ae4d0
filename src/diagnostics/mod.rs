pub mod coverage;

pub use self::coverage::ProtocolCoverage;
