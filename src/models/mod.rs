pub mod subscriber;

pub use subscriber::{NewSubscriberRequest, NewsletterRequest, NewsletterResponse, Subscriber};
