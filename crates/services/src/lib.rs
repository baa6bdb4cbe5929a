#![forbid(unsafe_code)]

pub mod bootstrap_service;
pub mod error;
pub mod gateway;
pub mod http_gateway;
pub mod poll_services;
pub mod question_service;
pub mod vote_service;

pub use bootstrap_service::BootstrapService;
pub use error::{BootstrapServiceError, GatewayError, QuestionServiceError, VoteServiceError};
pub use gateway::{InMemoryGateway, PollGateway};
pub use http_gateway::{HttpGatewayConfig, HttpPollGateway};
pub use poll_services::PollServices;
pub use question_service::QuestionService;
pub use vote_service::{VoteOutcome, VoteService};
