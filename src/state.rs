use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::federation::IdentityProvider;
use crate::auth::tokens::TokenIssuer;
use crate::config::Config;
use crate::graph::DynGraphRepository;
use crate::mailer::Mailer;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub tokens: TokenIssuer,
    pub graph: DynGraphRepository,
    pub mailer: Arc<dyn Mailer>,
    pub identity: Arc<dyn IdentityProvider>,
}
