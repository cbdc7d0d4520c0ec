/*! Core of an anonymous electronic voting service built on RSA blind signatures.

The server authenticates an eligible voter, signs a blinded commitment chosen
by the voter's client, then later accepts an anonymous ballot whose unblinded
signature proves it was authorized, without linking it to the signing session.

The crate is transport-agnostic: the embedding HTTP router parses requests,
passes the authenticated voter identity into [`service::VotingService`], and
maps the typed results and [`error::ServiceError`] values back onto responses. */

pub mod audit;
pub mod database;
pub mod election;
pub mod error;
pub mod keys;
pub mod service;
pub mod signer;
pub mod submit;
pub mod tally;
pub mod types;
pub mod util;

pub use database::Database;
pub use election::{Election, ElectionKind, Refusal};
pub use error::ServiceError;
pub use keys::KeyStore;
pub use service::VotingService;
pub use types::{Method, SignRequest, SignResponse, SubmitForm, SubmitResponse};
