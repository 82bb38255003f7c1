pub const SPBV01: &str = "spBv1.0";

pub const NODE_CONTROL_REBIRTH: &str = "Node Control/Rebirth";
pub const BDSEQ: &str = "bdSeq";

pub const NBIRTH: &str = "NBIRTH";
pub const NDEATH: &str = "NDEATH";
pub const NDATA: &str = "NDATA";
pub const NCMD: &str = "NCMD";

pub const STATE: &str = "STATE";

/// Sequence numbers and bdSeq wrap at this value
pub const SEQ_MODULO: u64 = 256;
