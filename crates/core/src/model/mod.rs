mod answer;
mod ids;
mod poll;
mod question;
mod session;
mod symbol;

pub use ids::{AnswerId, ModeratorId, ParseIdError, PollId, QuestionId, SessionId};
pub use symbol::{ParseSymbolError, Symbol};

pub use answer::Answer;
pub use poll::Poll;
pub use question::Question;
pub use session::{PollRef, Session, SessionCode, Token};
