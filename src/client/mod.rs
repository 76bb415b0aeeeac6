//! Owner-side publishing companion: session, staging cache, transcoding,
//! thumbnails and the publish flow against a running server.

pub mod publish;
pub mod session;
pub mod staging;
pub mod thumbnail;
pub mod transcode;
