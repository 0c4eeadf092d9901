//! The built-in tools of the worker model.

mod calculate;
mod push;
mod search;

pub use calculate::{CalcError, CalculateTool, Number, evaluate};
pub use push::PushTool;
pub use search::{
    DuckDuckGoProvider, SearchError, SearchProvider, SearchResult, SearchTool,
};
