//! Ledger Engine
//!
//! Executes the business operations of the coin economy as atomic
//! multi-step units over the stores:
//!
//! - **login / register**: authenticate, registering and crediting the
//!   account on first login
//! - **purchase**: debit the item price and add the item to the inventory
//! - **transfer**: move coins between two accounts and record the transfer
//! - **info**: consistent view of balance, inventory and coin history
//!
//! Every mutating operation runs in one [`TransactionCoordinator`] scope, so
//! a failure at any step leaves no partial effect behind. Nothing is retried:
//! a failed purchase or transfer has to be re-issued by the caller.
//!
//! # Lock order
//!
//! Operations touch rows in the order credentials, accounts (sorted by
//! username), inventory lines. Transfers lock both accounts in username order
//! regardless of direction, so opposite transfers between the same pair
//! cannot deadlock.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::coordinator::TransactionCoordinator;
use super::traits::{Ctx, LedgerStore};
use crate::auth::{hash_credential, verify_credential, CredentialError, Principal, TokenIssuer};
use crate::config::{LedgerConfig, SelfTransferPolicy};
use crate::types::{
    Account, AccountInfo, CoinHistory, Coins, ErrorKind, LedgerError, PurchaseReceipt,
    ReceivedTransfer, SentTransfer, Session, StoreError, TransferReceipt,
};

const LOGIN: &str = "auth.login";
const AUTHENTICATE: &str = "auth.token";
const REGISTER: &str = "ledger.register";
const PURCHASE: &str = "ledger.purchase";
const TRANSFER: &str = "ledger.transfer";
const INFO: &str = "ledger.info";
const ACCOUNTS: &str = "ledger.accounts";

fn wrap(operation: &'static str) -> impl Fn(StoreError) -> LedgerError {
    move |error| LedgerError::from_store(operation, error)
}

/// Run CPU-bound credential work on the blocking pool
async fn off_runtime<T, F>(operation: &'static str, work: F) -> Result<T, LedgerError>
where
    F: FnOnce() -> Result<T, CredentialError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| LedgerError::internal(operation, e.to_string()))?
        .map_err(|e| LedgerError::internal(operation, e.to_string()))
}

/// The ledger engine
///
/// Built once at startup and shared by cloning; clones share the store, the
/// token issuer and the configuration.
pub struct Ledger<S> {
    store: Arc<S>,
    coordinator: TransactionCoordinator<S>,
    tokens: Arc<TokenIssuer>,
    config: Arc<LedgerConfig>,
}

impl<S> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            coordinator: self.coordinator.clone(),
            tokens: Arc::clone(&self.tokens),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    /// Create a ledger over `store`
    ///
    /// The token issuer is built from `config.token`.
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        let tokens = Arc::new(TokenIssuer::new(
            config.token.secret.clone(),
            config.token.ttl,
        ));
        Self {
            coordinator: TransactionCoordinator::new(Arc::clone(&store)),
            store,
            tokens,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Token issuer, e.g. to rotate the signing secret
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Authenticate `username`, registering the account on first login
    ///
    /// # Arguments
    ///
    /// * `ctx` - Caller context
    /// * `username` - Account name; must not be blank
    /// * `password` - Must not be empty
    ///
    /// # Returns
    ///
    /// * `Ok(Session)` - principal and access token; `registered` tells
    ///   whether this call created the account
    /// * `Err(LedgerError::Unauthorized)` - the user exists with another password
    pub async fn login(
        &self,
        ctx: &Ctx<S>,
        username: &str,
        password: &str,
    ) -> Result<Session, LedgerError> {
        let result = self.login_inner(ctx, username, password).await;
        log_outcome(LOGIN, username, &result);
        result
    }

    async fn login_inner(
        &self,
        ctx: &Ctx<S>,
        username: &str,
        password: &str,
    ) -> Result<Session, LedgerError> {
        validate_credentials(LOGIN, username, password)?;

        match self.store.credential(ctx, username).await {
            Ok(stored) => self.open_session(username, password, stored).await,
            Err(e) if e.is_not_found() => {
                let credential = self.hash_password(LOGIN, password).await?;
                match self.register_credential(ctx, username, credential).await {
                    Err(LedgerError::Conflict { .. }) => {
                        // Lost a registration race; the winner's row decides.
                        debug!(username, "concurrent registration, verifying existing credential");
                        let stored = self
                            .store
                            .credential(ctx, username)
                            .await
                            .map_err(wrap(LOGIN))?;
                        self.open_session(username, password, stored).await
                    }
                    other => other,
                }
            }
            Err(e) => Err(LedgerError::from_store(LOGIN, e)),
        }
    }

    /// Register-and-Credit
    ///
    /// Creates the credential and account rows, credits the starting balance
    /// and issues a token, all in one transaction scope.
    ///
    /// # Returns
    ///
    /// * `Ok(Session)` - with `registered` set
    /// * `Err(LedgerError::Conflict)` - the username is taken
    pub async fn register(
        &self,
        ctx: &Ctx<S>,
        username: &str,
        password: &str,
    ) -> Result<Session, LedgerError> {
        let result = match validate_credentials(REGISTER, username, password) {
            Ok(()) => match self.hash_password(REGISTER, password).await {
                Ok(credential) => self.register_credential(ctx, username, credential).await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };
        log_outcome(REGISTER, username, &result);
        result
    }

    async fn register_credential(
        &self,
        ctx: &Ctx<S>,
        username: &str,
        credential: String,
    ) -> Result<Session, LedgerError> {
        let starting_balance = self.config.starting_balance;

        self.coordinator
            .run(ctx, |tx| async move {
                self.store
                    .insert_credential(&tx, username, &credential)
                    .await
                    .map_err(wrap(REGISTER))?;
                self.store
                    .create(&tx, username, 0)
                    .await
                    .map_err(wrap(REGISTER))?;
                self.store
                    .credit(&tx, username, starting_balance)
                    .await
                    .map_err(wrap(REGISTER))?;

                let token = self
                    .tokens
                    .issue(username)
                    .map_err(|e| LedgerError::internal(REGISTER, e.to_string()))?;

                Ok(Session {
                    principal: Principal::new(username),
                    token,
                    registered: true,
                })
            })
            .await
            .map_err(|e: LedgerError| e.in_operation(REGISTER))
    }

    /// Hash a password at the configured cost, off the async workers
    async fn hash_password(
        &self,
        operation: &'static str,
        password: &str,
    ) -> Result<String, LedgerError> {
        let password = password.to_string();
        let cost = self.config.credential_cost;
        off_runtime(operation, move || hash_credential(&password, cost)).await
    }

    async fn open_session(
        &self,
        username: &str,
        password: &str,
        stored: String,
    ) -> Result<Session, LedgerError> {
        let password = password.to_string();
        let matches = off_runtime(LOGIN, move || verify_credential(&password, &stored)).await?;
        if !matches {
            return Err(LedgerError::unauthorized(LOGIN, "invalid credentials"));
        }
        let token = self
            .tokens
            .issue(username)
            .map_err(|e| LedgerError::internal(LOGIN, e.to_string()))?;
        Ok(Session {
            principal: Principal::new(username),
            token,
            registered: false,
        })
    }

    /// Resolve an access token to the principal it was issued to
    pub fn authenticate(&self, token: &str) -> Result<Principal, LedgerError> {
        self.tokens
            .verify(token)
            .map_err(|e| LedgerError::unauthorized(AUTHENTICATE, e.to_string()))
    }

    /// Buy one unit of `item`
    ///
    /// The price is read before the transaction; catalog prices never change.
    /// Inside the transaction the buyer's balance row is locked, checked and
    /// debited, then the inventory line is created if missing and
    /// incremented.
    ///
    /// # Returns
    ///
    /// * `Ok(PurchaseReceipt)` - balance and quantity after the purchase
    /// * `Err(LedgerError::NotFound)` - unknown item
    /// * `Err(LedgerError::InsufficientFunds)` - balance below the price; nothing changed
    pub async fn purchase(
        &self,
        ctx: &Ctx<S>,
        principal: &Principal,
        item: &str,
    ) -> Result<PurchaseReceipt, LedgerError> {
        let result = self.purchase_inner(ctx, principal.username(), item).await;
        log_outcome(PURCHASE, principal.username(), &result);
        result
    }

    async fn purchase_inner(
        &self,
        ctx: &Ctx<S>,
        username: &str,
        item: &str,
    ) -> Result<PurchaseReceipt, LedgerError> {
        if item.trim().is_empty() {
            return Err(LedgerError::invalid_input(PURCHASE, "item must not be empty"));
        }

        let price = self
            .store
            .price_of(ctx, item)
            .await
            .map_err(wrap(PURCHASE))?;

        self.coordinator
            .run(ctx, |tx| async move {
                let balance = self
                    .store
                    .balance(&tx, username)
                    .await
                    .map_err(wrap(PURCHASE))?;
                if balance < price {
                    return Err(LedgerError::insufficient_funds(
                        PURCHASE, username, balance, price,
                    ));
                }
                self.store
                    .debit(&tx, username, price)
                    .await
                    .map_err(wrap(PURCHASE))?;

                let owned = self
                    .store
                    .exists(&tx, username, item)
                    .await
                    .map_err(wrap(PURCHASE))?;
                if !owned {
                    match self.store.create_line(&tx, username, item, 0).await {
                        Ok(()) => {}
                        Err(e) if e.is_conflict() => {
                            debug!(username, item, "inventory line created concurrently");
                        }
                        Err(e) => return Err(LedgerError::from_store(PURCHASE, e)),
                    }
                }
                let quantity = self
                    .store
                    .increment_quantity(&tx, username, item)
                    .await
                    .map_err(wrap(PURCHASE))?;

                Ok(PurchaseReceipt {
                    item: item.to_string(),
                    price,
                    balance: balance - price,
                    quantity,
                })
            })
            .await
            .map_err(|e: LedgerError| e.in_operation(PURCHASE))
    }

    /// Move `amount` coins from the principal to `to_user`
    ///
    /// Both balance rows are locked in username order before anything is
    /// written. A transfer to oneself is governed by
    /// [`SelfTransferPolicy`].
    ///
    /// # Returns
    ///
    /// * `Ok(TransferReceipt)` - with the sender's balance afterwards
    /// * `Err(LedgerError::InvalidInput)` - zero amount, blank recipient, or a
    ///   rejected self-transfer
    /// * `Err(LedgerError::NotFound)` - unknown recipient
    /// * `Err(LedgerError::InsufficientFunds)` - nothing changed
    pub async fn transfer(
        &self,
        ctx: &Ctx<S>,
        principal: &Principal,
        to_user: &str,
        amount: Coins,
    ) -> Result<TransferReceipt, LedgerError> {
        let result = self
            .transfer_inner(ctx, principal.username(), to_user, amount)
            .await;
        log_outcome(TRANSFER, principal.username(), &result);
        result
    }

    async fn transfer_inner(
        &self,
        ctx: &Ctx<S>,
        from_user: &str,
        to_user: &str,
        amount: Coins,
    ) -> Result<TransferReceipt, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::invalid_input(TRANSFER, "amount must be positive"));
        }
        if to_user.trim().is_empty() {
            return Err(LedgerError::invalid_input(TRANSFER, "recipient must not be empty"));
        }
        let to_self = from_user == to_user;
        if to_self && self.config.self_transfer == SelfTransferPolicy::Reject {
            return Err(LedgerError::invalid_input(
                TRANSFER,
                "cannot transfer coins to yourself",
            ));
        }

        self.coordinator
            .run(ctx, |tx| async move {
                let (first, second) = if from_user <= to_user {
                    (from_user, to_user)
                } else {
                    (to_user, from_user)
                };
                let first_balance = self
                    .store
                    .balance(&tx, first)
                    .await
                    .map_err(wrap(TRANSFER))?;
                let second_balance = if to_self {
                    first_balance
                } else {
                    self.store
                        .balance(&tx, second)
                        .await
                        .map_err(wrap(TRANSFER))?
                };
                let sender_balance = if first == from_user {
                    first_balance
                } else {
                    second_balance
                };

                if sender_balance < amount {
                    return Err(LedgerError::insufficient_funds(
                        TRANSFER,
                        from_user,
                        sender_balance,
                        amount,
                    ));
                }

                self.store
                    .debit(&tx, from_user, amount)
                    .await
                    .map_err(wrap(TRANSFER))?;
                self.store
                    .credit(&tx, to_user, amount)
                    .await
                    .map_err(wrap(TRANSFER))?;
                self.store
                    .append(&tx, from_user, to_user, amount)
                    .await
                    .map_err(wrap(TRANSFER))?;

                Ok(TransferReceipt {
                    from_user: from_user.to_string(),
                    to_user: to_user.to_string(),
                    amount,
                    balance: if to_self {
                        sender_balance
                    } else {
                        sender_balance - amount
                    },
                })
            })
            .await
            .map_err(|e: LedgerError| e.in_operation(TRANSFER))
    }

    /// Balance, inventory and coin history of the principal
    ///
    /// All parts are read in one transaction scope, so the view never mixes
    /// states from before and after a concurrent purchase or transfer.
    pub async fn info(
        &self,
        ctx: &Ctx<S>,
        principal: &Principal,
    ) -> Result<AccountInfo, LedgerError> {
        let username = principal.username();
        let result = self
            .coordinator
            .run(ctx, |tx| async move {
                let coins = self
                    .store
                    .balance(&tx, username)
                    .await
                    .map_err(wrap(INFO))?;
                let inventory = self.store.list(&tx, username).await.map_err(wrap(INFO))?;
                let received = self
                    .store
                    .received(&tx, username)
                    .await
                    .map_err(wrap(INFO))?;
                let sent = self.store.sent(&tx, username).await.map_err(wrap(INFO))?;

                Ok(AccountInfo {
                    username: username.to_string(),
                    coins,
                    inventory,
                    coin_history: CoinHistory {
                        received: received
                            .into_iter()
                            .map(|r| ReceivedTransfer {
                                from_user: r.from_user,
                                amount: r.amount,
                            })
                            .collect(),
                        sent: sent
                            .into_iter()
                            .map(|r| SentTransfer {
                                to_user: r.to_user,
                                amount: r.amount,
                            })
                            .collect(),
                    },
                })
            })
            .await
            .map_err(|e: LedgerError| e.in_operation(INFO));

        log_outcome(INFO, username, &result);
        result
    }

    /// Snapshot of every account, ordered by username
    pub async fn accounts(&self, ctx: &Ctx<S>) -> Result<Vec<Account>, LedgerError> {
        self.store.accounts(ctx).await.map_err(wrap(ACCOUNTS))
    }
}

fn validate_credentials(
    operation: &'static str,
    username: &str,
    password: &str,
) -> Result<(), LedgerError> {
    if username.trim().is_empty() {
        return Err(LedgerError::invalid_input(operation, "username must not be empty"));
    }
    if password.is_empty() {
        return Err(LedgerError::invalid_input(operation, "password must not be empty"));
    }
    Ok(())
}

fn log_outcome<T>(operation: &'static str, username: &str, result: &Result<T, LedgerError>) {
    match result {
        Ok(_) => info!(operation, username, "applied"),
        Err(e) => match e.kind() {
            ErrorKind::Internal => error!(operation, username, error = %e, "failed"),
            ErrorKind::Cancelled => debug!(operation, username, "cancelled"),
            _ => info!(operation, username, reason = %e, "rejected"),
        },
    }
}
