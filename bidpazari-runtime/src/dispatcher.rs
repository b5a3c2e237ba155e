use std::sync::{Arc, Mutex};

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::auction::spawn_ticker;
use crate::errors::{CommandFailed, InvalidPassword, UserVerificationError};
use crate::events::AuctionObserver;
use crate::model::{ItemId, Money, NewUser, OwnershipId, UserVerificationStatus};
use crate::password;
use crate::runtime::Runtime;
use crate::session_user::SessionUser;
use crate::strategies::StrategyParams;

/// Per-connection state a transport owns for the lifetime of one socket.
/// `session_user` starts empty and is bound by `create_user`/`login`.
pub struct SessionContext {
    session_user: Mutex<Option<Arc<SessionUser>>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        SessionContext {
            session_user: Mutex::new(None),
        }
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_user(&self) -> Option<Arc<SessionUser>> {
        self.session_user.lock().unwrap().clone()
    }

    fn bind(&self, session: Arc<SessionUser>) {
        *self.session_user.lock().unwrap() = Some(session);
    }

    fn unbind(&self) {
        *self.session_user.lock().unwrap() = None;
    }

    /// Resolves the bound session or raises the user-visible
    /// not-logged-in message every login-gated handler raises.
    fn require_login(&self) -> Result<Arc<SessionUser>, CommandFailed> {
        self.session_user()
            .ok_or_else(|| CommandFailed::message("You must log in to perform this action."))
    }
}

fn get_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, CommandFailed> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CommandFailed::message(format!("Missing or invalid parameter: {}", key)))
}

fn get_opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn get_u64(params: &Value, key: &str) -> Result<u64, CommandFailed> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| CommandFailed::message(format!("Missing or invalid parameter: {}", key)))
}

fn get_opt_bool(params: &Value, key: &str) -> Option<bool> {
    params.get(key).and_then(Value::as_bool)
}

/// Reads a wire money value and rejects anything that cannot round-trip
/// through two fractional digits without loss -- floats like `9.999`
/// never reach the runtime as `Money`.
fn get_money(params: &Value, key: &str) -> Result<Money, CommandFailed> {
    let raw = params
        .get(key)
        .ok_or_else(|| CommandFailed::message(format!("Missing parameter: {}", key)))?;

    let value = match raw {
        Value::Number(n) => n
            .as_f64()
            .and_then(Decimal::from_f64)
            .ok_or_else(|| CommandFailed::message(format!("Invalid amount for {}", key)))?,
        Value::String(s) => s
            .parse::<Decimal>()
            .map_err(|_| CommandFailed::message(format!("Invalid amount for {}", key)))?,
        _ => return Err(CommandFailed::message(format!("Invalid amount for {}", key))),
    };

    if value.round_dp(2) != value {
        return Err(CommandFailed::message(format!(
            "Amount for {} carries more than two fractional digits",
            key
        )));
    }
    Ok(value)
}

/// Dispatches one decoded `{command, params}` request against a bound
/// session context. The command-name -> handler mapping below is the
/// complete command surface; everything else is `InvalidCommand`.
pub async fn dispatch(
    runtime: &Runtime,
    ctx: &SessionContext,
    command: &str,
    params: Value,
) -> Result<Value, CommandFailed> {
    match command {
        "create_user" => create_user(runtime, ctx, &params),
        "login" => login(runtime, ctx, &params),
        "logout" => logout(runtime, ctx),
        "verify" => verify(runtime, ctx, &params),
        "change_password" => change_password(runtime, ctx, &params),
        "reset_password" => reset_password(runtime, &params),
        "add_balance" => add_balance(runtime, ctx, &params),
        "list_items" => list_items(runtime, ctx, &params),
        "view_transaction_history" => view_transaction_history(runtime, ctx),
        "create_auction" => create_auction(runtime, ctx, &params),
        "start_auction" => start_auction(runtime, ctx, &params).await,
        "bid" => bid(runtime, ctx, &params),
        "sell" => sell(runtime, ctx, &params),
        "view_auction_report" => view_auction_report(runtime, ctx, &params),
        "view_auction_history" => view_auction_history(runtime, ctx, &params),
        other => Err(CommandFailed::InvalidCommand(other.to_string())),
    }
}

fn create_user(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let username = get_str(params, "username")?;
    let email = get_str(params, "email")?;
    let raw_password = get_str(params, "password")?;
    let first_name = get_opt_str(params, "first_name").unwrap_or_default();
    let last_name = get_opt_str(params, "last_name").unwrap_or_default();

    let verification_code = password::random_verification_code();
    let user = runtime.store.create_user(NewUser {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: runtime.password_hasher.hash(raw_password),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        verification_code: verification_code.clone(),
    })?;

    runtime.mailer.send(
        &user.email,
        "Verify your bidpazari account",
        &format!("Your verification code is {}.", verification_code),
    );

    let session = runtime.registry.get_or_create_session_user(runtime.store.as_ref(), &user);
    ctx.bind(session);

    Ok(json!({ "id": user.id, "username": user.username }))
}

fn login(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let username = get_str(params, "username")?;
    let raw_password = get_str(params, "password")?;

    let user = runtime.store.find_user_by_username(username)?;
    if !runtime.password_hasher.verify(raw_password, &user.password_hash) {
        return Err(InvalidPassword.into());
    }

    let session = runtime.registry.get_or_create_session_user(runtime.store.as_ref(), &user);
    ctx.bind(session);

    Ok(json!({ "id": user.id, "username": user.username }))
}

fn logout(runtime: &Runtime, ctx: &SessionContext) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    runtime.registry.disconnect(session.user_id);
    ctx.unbind();
    Ok(json!({}))
}

fn verify(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    let code = get_str(params, "code")?;

    let mut user = runtime.store.find_user_by_id(session.user_id)?;
    if user.verification_code != code {
        return Err(UserVerificationError("Verification code does not match.".to_string()).into());
    }
    user.verification_status = UserVerificationStatus::Verified;
    runtime.store.save_user(&user)?;

    Ok(json!({ "verified": true }))
}

fn change_password(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    let old_password = get_str(params, "old_password")?;
    let new_password = get_str(params, "new_password")?;

    let mut user = runtime.store.find_user_by_id(session.user_id)?;
    if !runtime.password_hasher.verify(old_password, &user.password_hash) {
        return Err(InvalidPassword.into());
    }
    user.password_hash = runtime.password_hasher.hash(new_password);
    runtime.store.save_user(&user)?;

    Ok(json!({ "changed": true }))
}

/// Response is intentionally identical whether or not `email` belongs to
/// a known account -- this command must never leak account existence.
fn reset_password(runtime: &Runtime, params: &Value) -> Result<Value, CommandFailed> {
    let email = get_str(params, "email")?;

    if let Ok(mut user) = runtime.store.find_user_by_email(email) {
        let new_password = password::random_password(16);
        user.password_hash = runtime.password_hasher.hash(&new_password);
        runtime.store.save_user(&user)?;
        runtime.mailer.send(
            &user.email,
            "Your bidpazari password has been reset",
            &format!("Your new password is {}.", new_password),
        );
    }

    Ok(json!({
        "message": "If that email is registered, a new password has been sent."
    }))
}

fn add_balance(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    let amount = get_money(params, "amount")?;

    if session.cached_balance() + amount < Decimal::ZERO {
        return Err(CommandFailed::message(
            "Balance cannot go negative.",
        ));
    }

    let balance = session.add_balance_transaction(runtime.store.as_ref(), amount)?;
    Ok(json!({ "balance": balance.to_string() }))
}

fn list_items(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    let item_type = get_opt_str(params, "item_type");
    let on_sale = get_opt_bool(params, "on_sale");

    let items = runtime
        .store
        .list_items_for_user(session.user_id, item_type, on_sale)?;
    Ok(json!({ "items": items }))
}

fn view_transaction_history(runtime: &Runtime, ctx: &SessionContext) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    let history = runtime.store.transaction_history(session.user_id)?;
    Ok(json!({ "transactions": history }))
}

fn create_auction(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    let item_id: ItemId = get_u64(params, "item_id")?;
    let strategy_name = get_str(params, "strategy")?;

    let ownership = runtime
        .store
        .find_unsold_ownership_by_item(item_id)?
        .ok_or_else(|| CommandFailed::message("No unsold ownership for this item."))?;
    if ownership.user_id != session.user_id {
        return Err(CommandFailed::message("You do not own this item."));
    }

    let strategy_params = parse_strategy_params(strategy_name, params)?;
    let item = runtime.store.find_item_by_id(item_id)?;
    let initial_price = strategy_params.initial_price();
    let strategy = strategy_params.build();

    let auction = runtime
        .registry
        .create_auction(ownership.id, session.user_id, item_id, strategy)?;
    runtime.store.set_item_on_sale(item_id, true)?;
    runtime
        .registry
        .notify_item_watchers(item_id, &item.item_type, initial_price);

    Ok(json!({ "auction_id": auction.id }))
}

async fn start_auction(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    let auction_id: OwnershipId = get_u64(params, "auction_id")?;

    let auction = runtime.registry.get_auction(auction_id)?;
    if auction.owner_id != session.user_id {
        return Err(CommandFailed::message("Only the owner can start this auction."));
    }

    let tick = auction.start()?;
    if let Some(first_tick) = tick {
        spawn_ticker(
            &auction,
            Arc::clone(&runtime.store),
            Arc::clone(&runtime.registry),
            first_tick,
        );
    }

    Ok(json!({ "status": "open", "current_price": auction.current_price().to_string() }))
}

fn bid(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    let auction_id: OwnershipId = get_u64(params, "auction_id")?;
    let amount = params.get("amount").map(|_| get_money(params, "amount")).transpose()?;

    let auction = runtime.registry.get_auction(auction_id)?;
    if let Some(observer) = session.connection() {
        auction.register_observer(observer as Arc<dyn AuctionObserver>);
    }
    let (status, proceeds) = auction.bid(session, amount, runtime.store.as_ref())?;
    if let Some(proceeds) = proceeds {
        runtime.registry.credit_if_online(auction.owner_id, proceeds);
    }

    Ok(json!({
        "status": format!("{:?}", status).to_lowercase(),
        "current_price": auction.current_price().to_string(),
    }))
}

fn sell(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let session = ctx.require_login()?;
    let auction_id: OwnershipId = get_u64(params, "auction_id")?;

    let auction = runtime.registry.get_auction(auction_id)?;
    let proceeds = auction.sell(session.user_id, runtime.store.as_ref())?;
    runtime.registry.credit_if_online(auction.owner_id, proceeds);

    Ok(json!({ "status": "closed" }))
}

fn view_auction_report(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let _session = ctx.require_login()?;
    let auction_id: OwnershipId = get_u64(params, "auction_id")?;
    let auction = runtime.registry.get_auction(auction_id)?;
    Ok(auction.report())
}

fn view_auction_history(runtime: &Runtime, ctx: &SessionContext, params: &Value) -> Result<Value, CommandFailed> {
    let _session = ctx.require_login()?;
    let auction_id: OwnershipId = get_u64(params, "auction_id")?;
    let auction = runtime.registry.get_auction(auction_id)?;
    Ok(json!({ "history": auction.history() }))
}

fn parse_strategy_params(name: &str, params: &Value) -> Result<StrategyParams, CommandFailed> {
    match name {
        "increment" => Ok(StrategyParams::Increment {
            initial_price: get_money(params, "initial_price")?,
            minimum_increment: get_money(params, "minimum_increment")?,
            maximum_price: params
                .get("maximum_price")
                .filter(|v| !v.is_null())
                .map(|_| get_money(params, "maximum_price"))
                .transpose()?,
        }),
        "decrement" => Ok(StrategyParams::Decrement {
            initial_price: get_money(params, "initial_price")?,
            minimum_price: get_money(params, "minimum_price")?,
            price_decrement_rate: get_money(params, "price_decrement_rate")?,
            tick_ms: get_u64(params, "tick_ms")?,
        }),
        "highest_contribution" => Ok(StrategyParams::HighestContribution {
            minimum_bid_amount: get_money(params, "minimum_bid_amount")?,
            maximum_price: get_money(params, "maximum_price")?,
        }),
        other => Err(CommandFailed::message(format!("Unknown bidding strategy: {}", other))),
    }
}
