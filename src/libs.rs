
//! # Structural variant merging libraries
//!
//! Author: SASC - LUMC
//!
//! This libraries are a collection of functions and structures which
//! help merging structural variant calls from multiple callers.
//! They are in principle used by the `mergevcf` tool which takes the VCF
//! output of independent SV callers and reduces it to one consensus set
//! of events, reported as merged VCF, TSV table and BED tracks.
//!
//! The libraries are split into:
//!  - common: the event model, the matching predicate and the clustering
//!    together with all report rendering
//!  - hts_lib_based: functions specific for htslib derived input
//!

/// structures and logic independent of the VCF backend
pub mod lib {
    pub mod common;
    /// functions specific for htslib derived input
    pub mod hts_lib_based;
}
