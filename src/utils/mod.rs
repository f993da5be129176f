pub mod http_client;
pub mod notifier;

pub use http_client::HttpClientFactory;
pub use notifier::{ArticleMessage, DingTalkNotifier, NotificationSink, SlackNotifier};
