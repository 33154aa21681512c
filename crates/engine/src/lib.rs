mod compare;
mod creative;
mod simulator;

pub use compare::{
    compare, compare_decision_stages, compare_targeting_tree, fuzzy_contains, MismatchError,
};
pub use creative::{extract, resolve_price_macro, CreativeError, TrackerSet, AUCTION_PRICE_MACRO};
pub use simulator::{
    HttpReply, HttpSender, Simulator, SimulatorError, HTTP_MOVED_TEMP, HTTP_NO_CONTENT,
};
