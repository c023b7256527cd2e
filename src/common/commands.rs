/// Commands the UI sends to the reply worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Stream a bot reply to `text` into the placeholder `message_id`.
    RequestBotReply {
        conversation_id: String,
        message_id: String,
        text: String,
    },
    /// Answer with the canned reply after the configured delay.
    ScheduleHumanReply {
        conversation_id: String,
        sender_id: String,
    },
}
