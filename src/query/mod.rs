pub mod predicate;
pub mod options;
pub mod parser;
pub mod builder;
pub mod rewriter;
pub mod processor;
