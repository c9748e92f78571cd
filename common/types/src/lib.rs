mod post;

pub use post::{Post, Sentiment, Topic};
