use chrono::{DateTime, Utc};
use diesel::{
    AsChangeset, Selectable,
    prelude::{Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

// Catalog

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::categories)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CategoryEntity {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::categories)]
pub struct CreateCategoryEntity {
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i32>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: i32,
    pub seller_id: i32,
    pub category_id: Option<i32>,
    pub name: String,
    pub description: String,
    pub brand: Option<String>,
    pub mrp: i64,
    pub price: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::products)]
pub struct CreateProductEntity {
    pub seller_id: i32,
    pub category_id: Option<i32>,
    pub name: String,
    pub description: String,
    pub brand: Option<String>,
    pub mrp: i64,
    pub price: i64,
}

#[derive(AsChangeset, Deserialize, Debug, Default, ToSchema)]
#[diesel(table_name = crate::schema::products)]
pub struct UpdateProductEntity {
    pub category_id: Option<i32>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub mrp: Option<i64>,
    pub price: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::product_variants)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VariantEntity {
    pub id: i32,
    pub product_id: i32,
    pub sku: String,
    pub label: String,
    pub price: i64,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::product_variants)]
pub struct CreateVariantEntity {
    pub product_id: i32,
    pub sku: String,
    pub label: String,
    pub price: i64,
    pub stock: i32,
}

// Carts

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemEntity {
    pub user_id: i32,
    pub variant_id: i32,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct CreateCartItemEntity {
    pub user_id: i32,
    pub variant_id: i32,
    pub quantity: i32,
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub order_number: String,
    pub buyer_id: i32,
    pub status: String,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub points_redeemed: i64,
    pub shipping_address: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
pub struct CreateOrderEntity {
    pub order_number: String,
    pub buyer_id: i32,
    pub status: String,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub points_redeemed: i64,
    pub shipping_address: Value,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: i32,
    pub order_id: i32,
    pub product_id: i32,
    pub variant_id: i32,
    pub seller_id: i32,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub total_price: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub order_id: i32,
    pub product_id: i32,
    pub variant_id: i32,
    pub seller_id: i32,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
    pub total_price: i64,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::payments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PaymentEntity {
    pub id: Uuid,
    pub order_id: i32,
    pub amount: i64,
    pub status: String,
    pub provider: String,
    pub provider_order_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::payments)]
pub struct CreatePaymentEntity {
    pub id: Uuid,
    pub order_id: i32,
    pub amount: i64,
    pub status: String,
    pub provider: String,
    pub provider_order_id: Option<String>,
}

// Returns

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::return_requests)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReturnRequestEntity {
    pub id: i32,
    pub order_id: i32,
    pub buyer_id: i32,
    pub request_type: String,
    pub status: String,
    pub reason: String,
    pub admin_note: Option<String>,
    pub refund_amount: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::return_requests)]
pub struct CreateReturnRequestEntity {
    pub order_id: i32,
    pub buyer_id: i32,
    pub request_type: String,
    pub status: String,
    pub reason: String,
}

#[derive(Queryable, Selectable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::return_status_history)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReturnStatusHistoryEntity {
    pub id: i32,
    pub return_id: i32,
    pub from_status: String,
    pub to_status: String,
    pub actor_id: i32,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::return_status_history)]
pub struct CreateReturnStatusHistoryEntity {
    pub return_id: i32,
    pub from_status: String,
    pub to_status: String,
    pub actor_id: i32,
    pub note: Option<String>,
}

// Distributors

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::distributors)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DistributorEntity {
    pub id: i32,
    pub user_id: i32,
    pub business_name: String,
    pub phone: Option<String>,
    pub credit_limit: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::distributors)]
pub struct CreateDistributorEntity {
    pub user_id: i32,
    pub business_name: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub credit_limit: i64,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::distributor_ledger)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct LedgerEntryEntity {
    pub id: i32,
    pub distributor_id: i32,
    pub entry_type: String,
    pub amount: i64,
    pub balance_after: i64,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::distributor_ledger)]
pub struct CreateLedgerEntryEntity {
    pub distributor_id: i32,
    pub entry_type: String,
    pub amount: i64,
    pub balance_after: i64,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub note: Option<String>,
}

// Bulk ordering

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::bulk_items)]
#[diesel(primary_key(product_id))]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BulkItemEntity {
    pub product_id: i32,
    pub allow_pieces: bool,
    pub allow_sets: bool,
    pub pieces_per_set: i32,
    pub piece_price: i64,
    pub set_price: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::bulk_items)]
#[diesel(treat_none_as_null = true)]
pub struct UpsertBulkItemEntity {
    pub product_id: i32,
    pub allow_pieces: bool,
    pub allow_sets: bool,
    pub pieces_per_set: i32,
    pub piece_price: i64,
    pub set_price: Option<i64>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::bulk_orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BulkOrderEntity {
    pub id: i32,
    pub order_number: String,
    pub distributor_id: i32,
    pub status: String,
    pub total_amount: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::bulk_orders)]
pub struct CreateBulkOrderEntity {
    pub order_number: String,
    pub distributor_id: i32,
    pub status: String,
    pub total_amount: i64,
    pub note: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::bulk_order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BulkOrderItemEntity {
    pub id: i32,
    pub bulk_order_id: i32,
    pub product_id: i32,
    pub order_type: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::bulk_order_items)]
pub struct CreateBulkOrderItemEntity {
    pub bulk_order_id: i32,
    pub product_id: i32,
    pub order_type: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub total_price: i64,
}

// Notifications & rewards

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationEntity {
    pub id: i32,
    pub user_id: i32,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::notifications)]
pub struct CreateNotificationEntity {
    pub user_id: i32,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::reward_transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RewardTransactionEntity {
    pub id: i32,
    pub user_id: i32,
    pub points: i64,
    pub balance_after: i64,
    pub reason: String,
    pub order_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::reward_transactions)]
pub struct CreateRewardTransactionEntity {
    pub user_id: i32,
    pub points: i64,
    pub balance_after: i64,
    pub reason: String,
    pub order_id: Option<i32>,
}

// Content

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::content_pages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ContentPageEntity {
    pub id: i32,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub is_published: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::schema::content_pages)]
pub struct UpsertContentPageEntity {
    pub slug: String,
    pub title: String,
    pub body: String,
    pub is_published: bool,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone, ToSchema)]
#[diesel(table_name = crate::schema::footer_links)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FooterLinkEntity {
    pub id: i32,
    pub section: String,
    pub label: String,
    pub url: String,
    pub position: i32,
}

#[derive(Insertable, AsChangeset, Deserialize, Debug, ToSchema)]
#[diesel(table_name = crate::schema::footer_links)]
pub struct UpsertFooterLinkEntity {
    pub section: String,
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub position: i32,
}

// Outbox

#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::outbox)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OutboxEntity {
    pub id: i32,
    pub event_type: String,
    pub payload: String,
    pub status: String,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::outbox)]
pub struct CreateOutboxEntity {
    pub event_type: String,
    pub payload: String,
    pub status: String,
}
