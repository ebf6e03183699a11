use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::modules::{message::schema::MessageStatus, receipt::schema::ReceiptEntity};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkMessagesBody {
    #[validate(length(min = 1, max = 500))]
    pub message_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub status: MessageStatus,
}

/// Receipt counts of one message over the recipients that count toward its
/// status: active members other than the sender who have not blocked them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptTally {
    pub recipients: usize,
    pub delivered: usize,
    pub read: usize,
}

impl ReceiptTally {
    pub fn count(recipients: &[Uuid], receipts: &[&ReceiptEntity]) -> Self {
        let mut tally = ReceiptTally { recipients: recipients.len(), delivered: 0, read: 0 };
        for receipt in receipts.iter().filter(|r| recipients.contains(&r.user_id)) {
            if receipt.read_at.is_some() {
                tally.read += 1;
            }
            if receipt.delivered_at.is_some() || receipt.read_at.is_some() {
                tally.delivered += 1;
            }
        }
        tally
    }

    /// `read` needs every recipient; `delivered` needs any one.
    pub fn status(&self) -> MessageStatus {
        if self.recipients > 0 && self.read >= self.recipients {
            MessageStatus::Read
        } else if self.delivered > 0 {
            MessageStatus::Delivered
        } else {
            MessageStatus::Sent
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn receipt(user_id: Uuid, delivered: bool, read: bool) -> ReceiptEntity {
        ReceiptEntity {
            message_id: Uuid::nil(),
            user_id,
            delivered_at: delivered.then(Utc::now),
            read_at: read.then(Utc::now),
        }
    }

    #[test]
    fn test_group_read_requires_every_recipient() {
        let (bob, carol) = (Uuid::now_v7(), Uuid::now_v7());
        let recipients = [bob, carol];

        let none = ReceiptTally::count(&recipients, &[]);
        assert_eq!(none.status(), MessageStatus::Sent);

        let bob_read = receipt(bob, true, true);
        let one = ReceiptTally::count(&recipients, &[&bob_read]);
        assert_eq!(one.status(), MessageStatus::Delivered);

        let carol_read = receipt(carol, false, true);
        let both = ReceiptTally::count(&recipients, &[&bob_read, &carol_read]);
        assert_eq!(both.status(), MessageStatus::Read);
    }

    #[test]
    fn test_receipts_of_non_recipients_are_ignored() {
        let (bob, outsider) = (Uuid::now_v7(), Uuid::now_v7());
        let stray = receipt(outsider, true, true);

        let tally = ReceiptTally::count(&[bob], &[&stray]);
        assert_eq!(tally.status(), MessageStatus::Sent);
        assert_eq!(ReceiptTally::count(&[], &[]).status(), MessageStatus::Sent);
    }
}
