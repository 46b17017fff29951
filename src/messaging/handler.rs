use async_trait::async_trait;

use crate::contracts::{Context, HandleMessageError, Message};

/// Application logic plugged into a [`Consumer`](super::Consumer).
///
/// Receives the decoded input and may produce an output, which the consumer
/// republishes when it has an outgoing queue.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Input: Message;
    type Output: Message;

    async fn handle_message(
        &self,
        context: &Context<'_>,
        input: Self::Input,
    ) -> Result<Option<Self::Output>, HandleMessageError>;
}
