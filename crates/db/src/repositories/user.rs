//! User repository for database operations.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryOrder,
    QuerySelect, Set,
};
use tally_core::ledger::UserBalance;
use tally_shared::types::{PageRequest, PageResponse, UserId};

use super::conversion::user_to_core;
use crate::entities::users;

/// User repository for balance lookups and seeding.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: DatabaseConnection,
}

impl UserRepository {
    /// Creates a new user repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_id(&self, id: UserId) -> Result<Option<UserBalance>, DbErr> {
        let user = users::Entity::find_by_id(id.into_inner()).one(&self.db).await?;
        Ok(user.map(user_to_core))
    }

    /// Lists users ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(&self, page: PageRequest) -> Result<PageResponse<UserBalance>, DbErr> {
        let total = users::Entity::find().count(&self.db).await?;
        let rows = users::Entity::find()
            .order_by_asc(users::Column::Name)
            .order_by_asc(users::Column::Id)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await?;
        let data = rows.into_iter().map(user_to_core).collect();
        Ok(PageResponse::new(data, page.page, page.per_page, total))
    }

    /// Creates a user with an opening balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn create(&self, name: &str, balance: Decimal) -> Result<UserBalance, DbErr> {
        let now = Utc::now().into();
        let user = users::ActiveModel {
            id: Set(UserId::new().into_inner()),
            name: Set(name.to_string()),
            balance: Set(balance),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = user.insert(&self.db).await?;
        Ok(user_to_core(model))
    }

    /// Checks that the database answers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn ping(&self) -> Result<(), DbErr> {
        self.db.ping().await
    }
}
