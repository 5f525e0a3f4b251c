//! Row shapes as stored in PostgreSQL, and their conversion into entities.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use bidhub_core::error::AppError;
use bidhub_core::result::AppResult;
use bidhub_core::types::id::{AuctionId, BidId, NotificationId, UserId};
use bidhub_entity::auction::{AuctionStatus, LiveAuction};
use bidhub_entity::bid::Bid;
use bidhub_entity::notification::{LiveNotification, NotificationKind};

/// `auctions` row.
#[derive(Debug, Clone, FromRow)]
pub struct AuctionRow {
    pub id: Uuid,
    pub title: String,
    pub current_bid: i64,
    pub starting_bid: i64,
    pub bid_count: i64,
    pub ends_at: DateTime<Utc>,
    pub status: String,
    pub seller_id: Uuid,
    pub category: String,
    pub participants: i32,
}

impl TryFrom<AuctionRow> for LiveAuction {
    type Error = AppError;

    fn try_from(row: AuctionRow) -> AppResult<Self> {
        Ok(Self {
            id: AuctionId::from_uuid(row.id),
            title: row.title,
            current_bid: row.current_bid,
            starting_bid: row.starting_bid,
            bid_count: u64::try_from(row.bid_count).unwrap_or(0),
            ends_at: row.ends_at,
            status: row.status.parse::<AuctionStatus>()?,
            seller_id: UserId::from_uuid(row.seller_id),
            category: row.category,
            participants: u32::try_from(row.participants).unwrap_or(0),
        })
    }
}

/// `bids` row.
#[derive(Debug, Clone, FromRow)]
pub struct BidRow {
    pub id: Uuid,
    pub auction_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub is_winning: bool,
}

impl From<BidRow> for Bid {
    fn from(row: BidRow) -> Self {
        Self {
            id: BidId::from_uuid(row.id),
            auction_id: AuctionId::from_uuid(row.auction_id),
            user_id: UserId::from_uuid(row.user_id),
            username: row.username,
            amount: row.amount,
            timestamp: row.created_at,
            is_winning: row.is_winning,
        }
    }
}

/// `notifications` row.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

impl TryFrom<NotificationRow> for LiveNotification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> AppResult<Self> {
        let kind = NotificationKind::parse(&row.kind).ok_or_else(|| {
            AppError::database(format!(
                "Notification {} has unknown kind '{}'",
                row.id, row.kind
            ))
        })?;
        Ok(Self {
            id: NotificationId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            kind,
            title: row.title,
            message: row.message,
            action_url: row.action_url,
            timestamp: row.created_at,
            read: row.is_read,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auction_row(status: &str) -> AuctionRow {
        AuctionRow {
            id: Uuid::new_v4(),
            title: "Signed first edition".into(),
            current_bid: 250,
            starting_bid: 100,
            bid_count: 3,
            ends_at: Utc::now(),
            status: status.into(),
            seller_id: Uuid::new_v4(),
            category: "books".into(),
            participants: 2,
        }
    }

    #[test]
    fn test_auction_row_converts() {
        let row = auction_row("live");
        let id = row.id;
        let auction = LiveAuction::try_from(row).unwrap();
        assert_eq!(auction.id.into_uuid(), id);
        assert_eq!(auction.status, AuctionStatus::Live);
        assert_eq!((auction.current_bid, auction.bid_count), (250, 3));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(LiveAuction::try_from(auction_row("paused")).is_err());
    }

    #[test]
    fn test_notification_row_converts() {
        let row = NotificationRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: "auction_ending".into(),
            title: "Ending soon".into(),
            message: "Five minutes left".into(),
            action_url: None,
            created_at: Utc::now(),
            is_read: true,
        };
        let notification = LiveNotification::try_from(row.clone()).unwrap();
        assert_eq!(notification.kind, NotificationKind::AuctionEnding);
        assert!(notification.read);

        let bad = NotificationRow {
            kind: "carrier_pigeon".into(),
            ..row
        };
        assert!(LiveNotification::try_from(bad).is_err());
    }
}
