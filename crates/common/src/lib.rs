// pairlab-common: shared wire-protocol types for the pairlab workspace

pub mod protocol;
