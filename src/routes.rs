use axum::{
    handler::Handler,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch},
    Router,
};

use crate::handlers::{accounts, customers, deposits, health, transactions, users};
use crate::middleware::{apply_middleware, jwt_auth_middleware, require_admin};
use crate::state::AppState;

/// The full application: public routes, the authenticated `/v1` surface and
/// the middleware stack.
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    let public = Router::new()
        .route("/", get(health::root))
        .route("/ping", get(health::ping))
        .route("/v1/health", get(health::health));

    let protected = Router::new()
        .merge(customer_routes())
        .merge(account_routes())
        .merge(deposit_routes())
        .merge(transaction_routes())
        .merge(user_routes())
        .route_layer(from_fn_with_state(state.clone(), jwt_auth_middleware));

    apply_middleware(public.merge(protected), &config).with_state(state)
}

fn customer_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/customers",
            get(customers::find)
                .post(customers::create.layer(from_fn(require_admin)))
                .patch(customers::update.layer(from_fn(require_admin))),
        )
        .route("/v1/customers/archive", patch(customers::archive.layer(from_fn(require_admin))))
        .route(
            "/v1/customers/:id",
            get(customers::read).delete(customers::delete.layer(from_fn(require_admin))),
        )
}

fn account_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/accounts",
            get(accounts::find)
                .post(accounts::create.layer(from_fn(require_admin)))
                .patch(accounts::update.layer(from_fn(require_admin))),
        )
        .route("/v1/accounts/archive", patch(accounts::archive.layer(from_fn(require_admin))))
        .route(
            "/v1/accounts/:id",
            get(accounts::read).delete(accounts::delete.layer(from_fn(require_admin))),
        )
}

/// Deposits are recorded and changed by admins; any rep may read them.
fn deposit_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/deposits",
            get(deposits::find)
                .post(deposits::create.layer(from_fn(require_admin)))
                .patch(deposits::update.layer(from_fn(require_admin))),
        )
        .route("/v1/deposits/archive", patch(deposits::archive.layer(from_fn(require_admin))))
        .route(
            "/v1/deposits/:id",
            get(deposits::read).delete(deposits::delete.layer(from_fn(require_admin))),
        )
}

fn transaction_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/transactions",
            get(transactions::find)
                .post(transactions::create)
                .patch(transactions::update.layer(from_fn(require_admin))),
        )
        .route("/v1/transactions/archive", patch(transactions::archive.layer(from_fn(require_admin))))
        .route("/v1/transactions/totals", get(transactions::totals))
        .route(
            "/v1/transactions/:id",
            get(transactions::read).delete(transactions::delete.layer(from_fn(require_admin))),
        )
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users", get(users::find))
        .route("/v1/users/:id", get(users::read))
}
