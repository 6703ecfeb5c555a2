//! Route definitions for the Storefront Books back-end
//!
//! One resource router per document kind under /v1, all bearer-protected.
//! The voucher and payment kinds share handler sets; the kind is injected
//! per subtree as an extension.

use axum::{
    middleware,
    routing::{get, post},
    Extension, Router,
};

use shared::models::VoucherKind;

use crate::services::payment::PaymentKind;
use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Tenant roots
        .nest("/store", store_routes())
        .nest("/customer", customer_routes())
        .nest("/vendor", vendor_routes())
        .nest("/product", product_routes())
        // Goods documents
        .nest("/sales", sales_routes())
        .nest("/sales-return", sales_return_routes())
        .nest("/purchase", purchase_routes())
        .nest("/purchase-return", purchase_return_routes())
        .nest("/quotation", quotation_routes())
        .nest("/quotation-sales-return", quotation_return_routes())
        // Payments
        .nest(
            "/sales-payment",
            payment_routes(PaymentKind::SalesPayment),
        )
        .nest(
            "/purchase-payment",
            payment_routes(PaymentKind::PurchasePayment),
        )
        // Amount-driven vouchers
        .nest("/capital", voucher_routes(VoucherKind::Capital))
        .nest(
            "/capital-withdrawal",
            voucher_routes(VoucherKind::CapitalWithdrawal),
        )
        .nest("/dividend", voucher_routes(VoucherKind::Dividend))
        .nest("/expense", voucher_routes(VoucherKind::Expense))
        .nest(
            "/customer-deposit",
            voucher_routes(VoucherKind::CustomerDeposit),
        )
        .nest(
            "/customer-withdrawal",
            voucher_routes(VoucherKind::CustomerWithdrawal),
        )
        // Ledger read side
        .nest("/account", account_routes())
        .route(
            "/posting",
            get(handlers::list_postings).route_layer(middleware::from_fn(auth_middleware)),
        )
        .route(
            "/ledger",
            get(handlers::list_ledger).route_layer(middleware::from_fn(auth_middleware)),
        )
}

fn store_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_stores).post(handlers::create_store))
        .route(
            "/:store_id",
            get(handlers::get_store)
                .put(handlers::update_store)
                .delete(handlers::delete_store),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn customer_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_customers).post(handlers::create_customer),
        )
        .route(
            "/:customer_id",
            get(handlers::get_customer)
                .put(handlers::update_customer)
                .delete(handlers::delete_customer),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn vendor_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_vendors).post(handlers::create_vendor),
        )
        .route(
            "/:vendor_id",
            get(handlers::get_vendor)
                .put(handlers::update_vendor)
                .delete(handlers::delete_vendor),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_products).post(handlers::create_product),
        )
        .route(
            "/:product_id",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn sales_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_sales).post(handlers::create_sales))
        .route(
            "/:sales_id",
            get(handlers::get_sales)
                .put(handlers::update_sales)
                .delete(handlers::delete_sales),
        )
        .route("/:sales_id/report", post(handlers::retry_sales_report))
        .route_layer(middleware::from_fn(auth_middleware))
}

fn sales_return_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_sales_returns).post(handlers::create_sales_return),
        )
        .route(
            "/:return_id",
            get(handlers::get_sales_return)
                .put(handlers::update_sales_return)
                .delete(handlers::delete_sales_return),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_purchases).post(handlers::create_purchase),
        )
        .route(
            "/:purchase_id",
            get(handlers::get_purchase)
                .put(handlers::update_purchase)
                .delete(handlers::delete_purchase),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn purchase_return_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_purchase_returns).post(handlers::create_purchase_return),
        )
        .route(
            "/:return_id",
            get(handlers::get_purchase_return)
                .put(handlers::update_purchase_return)
                .delete(handlers::delete_purchase_return),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn quotation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_quotations).post(handlers::create_quotation),
        )
        .route(
            "/:quotation_id",
            get(handlers::get_quotation)
                .put(handlers::update_quotation)
                .delete(handlers::delete_quotation),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn quotation_return_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_quotation_returns).post(handlers::create_quotation_return),
        )
        .route(
            "/:return_id",
            get(handlers::get_quotation_return).delete(handlers::delete_quotation_return),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

fn payment_routes(kind: PaymentKind) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_payments).post(handlers::create_payment),
        )
        .route(
            "/:payment_id",
            get(handlers::get_payment)
                .put(handlers::update_payment)
                .delete(handlers::delete_payment),
        )
        .route_layer(middleware::from_fn(auth_middleware))
        .layer(Extension(kind))
}

fn voucher_routes(kind: VoucherKind) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_vouchers).post(handlers::create_voucher),
        )
        .route(
            "/:voucher_id",
            get(handlers::get_voucher)
                .put(handlers::update_voucher)
                .delete(handlers::delete_voucher),
        )
        .route_layer(middleware::from_fn(auth_middleware))
        .layer(Extension(kind))
}

fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_accounts))
        .route("/:account_id", get(handlers::get_account))
        .route_layer(middleware::from_fn(auth_middleware))
}
