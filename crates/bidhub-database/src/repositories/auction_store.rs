//! PostgreSQL-backed [`AuctionStore`].
//!
//! Bids are accepted by a single conditional `UPDATE` on the auction row;
//! the row lock it takes serializes concurrent bidders. Change events are
//! published after commit while the store's write lock is held, so
//! subscribers on this node see writes in commit order.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bidhub_core::error::{AppError, ErrorKind};
use bidhub_core::result::AppResult;
use bidhub_core::types::id::{AuctionId, UserId};
use bidhub_entity::auction::{AuctionStatus, LiveAuction};
use bidhub_entity::bid::{Bid, BidReceipt, NewBid};
use bidhub_entity::notification::LiveNotification;
use bidhub_realtime::channel::ChannelType;
use bidhub_realtime::message::types::ChannelEvent;
use bidhub_realtime::{AuctionStore, RealtimeTransport};

use super::rows::{AuctionRow, BidRow, NotificationRow};

/// Auction store over the `auctions`, `bids`, and `notifications` tables.
#[derive(Debug)]
pub struct PgAuctionStore {
    pool: PgPool,
    /// Change feed target. `None` keeps the store silent.
    transport: Option<Arc<dyn RealtimeTransport>>,
    write_lock: Mutex<()>,
}

impl PgAuctionStore {
    /// Create a store that publishes no change events.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            transport: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Create a store that publishes change events on `transport`.
    pub fn with_transport(pool: PgPool, transport: Arc<dyn RealtimeTransport>) -> Self {
        Self {
            transport: Some(transport),
            ..Self::new(pool)
        }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit()
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to commit transaction", e))
    }

    async fn emit(&self, topic: ChannelType, event: ChannelEvent) {
        let Some(transport) = &self.transport else {
            return;
        };
        let topic = topic.to_topic();
        if let Err(e) = transport.publish(&topic, event).await {
            warn!(topic = %topic, error = %e, "Failed to publish change event");
        }
    }

    /// Distinguish a missing auction from a lost race once the conditional
    /// update matched nothing.
    async fn rejection(&self, new_bid: &NewBid) -> AppError {
        match self.get_auction(new_bid.auction_id).await {
            Ok(None) => AppError::not_found(format!("Auction {} not found", new_bid.auction_id)),
            Ok(Some(auction)) if !auction.status.accepts_bids() => AppError::conflict(format!(
                "Auction {} is {}",
                auction.id, auction.status
            )),
            Ok(Some(auction)) => AppError::conflict(format!(
                "Bid {} does not beat current price {}",
                new_bid.amount, auction.current_bid
            )),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl AuctionStore for PgAuctionStore {
    async fn get_auction(&self, id: AuctionId) -> AppResult<Option<LiveAuction>> {
        let row = sqlx::query_as::<_, AuctionRow>("SELECT * FROM auctions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to fetch auction", e))?;
        row.map(LiveAuction::try_from).transpose()
    }

    async fn list_bids(&self, id: AuctionId) -> AppResult<Vec<Bid>> {
        let rows = sqlx::query_as::<_, BidRow>(
            "SELECT * FROM bids WHERE auction_id = $1 ORDER BY created_at ASC, amount ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list bids", e))?;
        Ok(rows.into_iter().map(Bid::from).collect())
    }

    async fn insert_bid(&self, new_bid: NewBid) -> AppResult<BidReceipt> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.begin().await?;

        let priced = sqlx::query_scalar::<_, Uuid>(
            "UPDATE auctions SET current_bid = $2, bid_count = bid_count + 1 \
             WHERE id = $1 AND status = 'live' AND current_bid < $2 \
             RETURNING id",
        )
        .bind(new_bid.auction_id)
        .bind(new_bid.amount)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to price auction", e))?;

        if priced.is_none() {
            drop(tx);
            return Err(self.rejection(&new_bid).await);
        }

        sqlx::query("UPDATE bids SET is_winning = FALSE WHERE auction_id = $1 AND is_winning")
            .bind(new_bid.auction_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to demote bids", e))?;

        let bid_row = sqlx::query_as::<_, BidRow>(
            "INSERT INTO bids (id, auction_id, user_id, username, amount, is_winning) \
             VALUES ($1, $2, $3, $4, $5, TRUE) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(new_bid.auction_id)
        .bind(new_bid.user_id)
        .bind(&new_bid.username)
        .bind(new_bid.amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert bid", e))?;

        let auction_row = sqlx::query_as::<_, AuctionRow>(
            "UPDATE auctions SET participants = \
             (SELECT COUNT(DISTINCT user_id) FROM bids WHERE auction_id = $1) \
             WHERE id = $1 RETURNING *",
        )
        .bind(new_bid.auction_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to count participants", e)
        })?;

        Self::commit(tx).await?;

        let bid = Bid::from(bid_row);
        let auction = LiveAuction::try_from(auction_row)?;
        let receipt = BidReceipt {
            bid: bid.clone(),
            current_bid: auction.current_bid,
            bid_count: auction.bid_count,
        };
        debug!(
            auction_id = %auction.id,
            amount = bid.amount,
            bid_count = auction.bid_count,
            "Bid committed"
        );

        let topic = ChannelType::Auction(auction.id);
        self.emit(
            topic,
            ChannelEvent::BidInserted {
                bid,
                bid_count: receipt.bid_count,
            },
        )
        .await;
        self.emit(topic, ChannelEvent::AuctionUpdated { auction }).await;

        Ok(receipt)
    }

    async fn update_status(&self, id: AuctionId, status: AuctionStatus) -> AppResult<LiveAuction> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.begin().await?;

        let current = sqlx::query_as::<_, AuctionRow>("SELECT * FROM auctions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock auction", e))?
            .ok_or_else(|| AppError::not_found(format!("Auction {id} not found")))?;
        let current = LiveAuction::try_from(current)?;

        if !current.status.can_transition_to(status) {
            return Err(AppError::conflict(format!(
                "Cannot move auction {id} from {} to {status}",
                current.status
            )));
        }

        let row = sqlx::query_as::<_, AuctionRow>(
            "UPDATE auctions SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update status", e))?;

        Self::commit(tx).await?;
        let updated = LiveAuction::try_from(row)?;
        info!(auction_id = %id, status = %status, "Auction status changed");

        self.emit(
            ChannelType::Auction(id),
            ChannelEvent::AuctionUpdated {
                auction: updated.clone(),
            },
        )
        .await;
        Ok(updated)
    }

    async fn list_notifications(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<LiveNotification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT * FROM notifications WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list notifications", e))?;
        rows.into_iter().map(LiveNotification::try_from).collect()
    }

    async fn insert_notification(&self, notification: LiveNotification) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(
            "INSERT INTO notifications (id, user_id, kind, title, message, action_url, created_at, is_read) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.action_url.as_deref())
        .bind(notification.timestamp)
        .bind(notification.read)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to insert notification", e))?;

        self.emit(
            ChannelType::Notifications(notification.user_id),
            ChannelEvent::NotificationInserted { notification },
        )
        .await;
        Ok(())
    }
}
