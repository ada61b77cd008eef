//! Integration tests for the pullstream pull engine

mod backend_listing;
mod byte_stream_pull;
mod cli_pull;
mod config_integration;
mod decoder_chunking;
