pub mod lookahead;
