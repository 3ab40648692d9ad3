use actix_web::{web, HttpResponse, Responder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::DispatchContext;
use crate::coordinator::DispatchError;
use crate::invoice::InvoiceDocument;
use crate::model::Order;
use crate::state_machine::OrderStatus;
use crate::store::StoreError;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    providers: Vec<String>,
}

pub async fn health_check(ctx: web::Data<DispatchContext>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers: ctx.registry.provider_ids(),
    })
}

#[derive(Deserialize)]
pub struct NewOrderRequest {
    #[serde(default)]
    pub order_id: Option<String>,
    pub customer_name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    pub address: String,
    #[serde(default)]
    pub division: Option<String>,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub amount: Decimal,
    #[serde(default)]
    pub delivery_charge: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

pub async fn create_order(
    ctx: web::Data<DispatchContext>,
    body: web::Json<NewOrderRequest>,
) -> impl Responder {
    let req = body.into_inner();
    let order_id = req
        .order_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("ORD-{}", Uuid::new_v4().simple()));

    let mut order = Order::new(
        order_id,
        req.customer_name,
        req.phone,
        req.address,
        req.product_id,
        req.product_name,
        req.quantity,
        req.amount,
    );
    order.email = req.email;
    order.division = req.division;
    order.delivery_charge = req.delivery_charge;
    order.note = req.note;

    match ctx.store.insert(order).await {
        Ok(versioned) => HttpResponse::Created().json(serde_json::json!({
            "order": versioned.order,
            "version": versioned.version,
        })),
        Err(StoreError::Duplicate(id)) => HttpResponse::Conflict().json(serde_json::json!({
            "error": "duplicate_order",
            "message": format!("Order already exists: {}", id),
        })),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "store_error",
            "message": err.to_string(),
        })),
    }
}

pub async fn get_order(
    ctx: web::Data<DispatchContext>,
    path: web::Path<String>,
) -> impl Responder {
    match ctx.store.get(&path.into_inner()).await {
        Ok(versioned) => HttpResponse::Ok().json(serde_json::json!({
            "order": versioned.order,
            "version": versioned.version,
        })),
        Err(err) => store_error_response(err),
    }
}

#[derive(Deserialize)]
pub struct StatusChangeRequest {
    pub status: OrderStatus,
}

pub async fn change_status(
    ctx: web::Data<DispatchContext>,
    path: web::Path<String>,
    body: web::Json<StatusChangeRequest>,
) -> impl Responder {
    let order_id = path.into_inner();
    match ctx
        .coordinator
        .change_status(&order_id, body.status)
        .await
    {
        Ok(versioned) => HttpResponse::Ok().json(serde_json::json!({
            "order": versioned.order,
            "version": versioned.version,
        })),
        Err(err) => dispatch_error_response(&err),
    }
}

#[derive(Deserialize)]
pub struct ProviderRequest {
    pub provider: String,
}

pub async fn dispatch_order(
    ctx: web::Data<DispatchContext>,
    path: web::Path<String>,
    body: web::Json<ProviderRequest>,
) -> impl Responder {
    let order_id = path.into_inner();
    match ctx
        .coordinator
        .send_to_courier(&order_id, &body.provider)
        .await
    {
        Ok(receipt) => HttpResponse::Ok().json(serde_json::json!({
            "order": receipt.order,
            "version": receipt.version,
            "provider": receipt.provider,
            "tracking_id": receipt.tracking_id,
            "attempts": receipt.attempts,
        })),
        Err(err) => dispatch_error_response(&err),
    }
}

pub async fn fraud_check(
    ctx: web::Data<DispatchContext>,
    path: web::Path<String>,
    body: web::Json<ProviderRequest>,
) -> impl Responder {
    let order_id = path.into_inner();
    let order = match ctx.store.get(&order_id).await {
        Ok(versioned) => versioned.order,
        Err(err) => return store_error_response(err),
    };

    match ctx.fraud.check(&order, &body.provider).await {
        Ok(verdict) => HttpResponse::Ok().json(verdict),
        Err(err) => dispatch_error_response(&err),
    }
}

pub async fn get_invoice(
    ctx: web::Data<DispatchContext>,
    path: web::Path<String>,
) -> impl Responder {
    match ctx.store.get(&path.into_inner()).await {
        Ok(versioned) => {
            let invoice = InvoiceDocument::from_order(&versioned.order);
            HttpResponse::Ok().json(serde_json::json!({
                "invoice": invoice,
                "rendered": invoice.render_text(),
            }))
        }
        Err(err) => store_error_response(err),
    }
}

/// Each error kind maps to a distinct status and an actionable message; the
/// admin shell shows these verbatim as toasts.
fn dispatch_error_response(err: &DispatchError) -> HttpResponse {
    let body = serde_json::json!({
        "error": err.kind(),
        "message": err.to_string(),
    });
    match err {
        DispatchError::OrderNotFound(_) => HttpResponse::NotFound().json(body),
        DispatchError::ConfigurationMissing(_)
        | DispatchError::MissingRequiredField(_)
        | DispatchError::ProviderValidation(_) => HttpResponse::UnprocessableEntity().json(body),
        DispatchError::AlreadyDispatched { tracking_id, .. } => {
            HttpResponse::Conflict().json(serde_json::json!({
                "error": err.kind(),
                "message": err.to_string(),
                "tracking_id": tracking_id,
            }))
        }
        DispatchError::InvalidTransition(_) | DispatchError::StaleOrderState(_) => {
            HttpResponse::Conflict().json(body)
        }
        DispatchError::ProviderRejected(_) => HttpResponse::UnprocessableEntity().json(body),
        DispatchError::ProviderAuth(_) => HttpResponse::BadGateway().json(body),
        DispatchError::ProviderTransport(_) => HttpResponse::GatewayTimeout().json(body),
    }
}

fn store_error_response(err: StoreError) -> HttpResponse {
    dispatch_error_response(&DispatchError::from(err))
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/orders").route(web::post().to(create_order)))
        .service(
            web::resource("/orders/{id}")
                .route(web::get().to(get_order)),
        )
        .service(
            web::resource("/orders/{id}/status").route(web::post().to(change_status)),
        )
        .service(
            web::resource("/orders/{id}/dispatch").route(web::post().to(dispatch_order)),
        )
        .service(
            web::resource("/orders/{id}/fraud-check").route(web::post().to(fraud_check)),
        )
        .service(
            web::resource("/orders/{id}/invoice").route(web::get().to(get_invoice)),
        );
}
