//! Process-lifetime session cache holding accounts, the active account, and token records.
//!
//! Nothing is written to disk: like a browser tab's session storage, the cache disappears with
//! the process that owns it.

// self
use crate::{
	_prelude::*,
	auth::{Account, AccountId, ScopeSet, TokenRecord, TokenSecret},
};

/// Unique key identifying a cached token record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Account component.
	pub account: AccountId,
	/// Resource scope fingerprint used for partitioning.
	pub scope_fingerprint: String,
}
impl CacheKey {
	/// Builds a key from an account and its resource scopes.
	pub fn new(account: &AccountId, scope: &ScopeSet) -> Self {
		Self { account: account.clone(), scope_fingerprint: scope.fingerprint() }
	}
}

#[derive(Debug, Default)]
struct CacheState {
	// Sign-in order is preserved; the first entry becomes active when none is chosen.
	accounts: Vec<Account>,
	active: Option<AccountId>,
	tokens: HashMap<CacheKey, TokenRecord>,
}

/// Thread-safe in-memory cache shared by the auth provider.
#[derive(Clone, Debug, Default)]
pub struct SessionCache(Arc<RwLock<CacheState>>);
impl SessionCache {
	/// Inserts or replaces an account, keeping its original position.
	pub fn save_account(&self, account: Account) {
		let mut state = self.0.write();

		match state.accounts.iter_mut().find(|known| known.home_account_id == account.home_account_id)
		{
			Some(slot) => *slot = account,
			None => state.accounts.push(account),
		}
	}

	/// Returns every cached account in sign-in order.
	pub fn accounts(&self) -> Vec<Account> {
		self.0.read().accounts.clone()
	}

	/// Returns the active account, if it is still cached.
	pub fn active_account(&self) -> Option<Account> {
		let state = self.0.read();
		let active = state.active.as_ref()?;

		state.accounts.iter().find(|account| &account.home_account_id == active).cloned()
	}

	/// Marks an account active (caching it when unknown) or clears the selection.
	pub fn set_active_account(&self, account: Option<Account>) {
		match account {
			Some(account) => {
				let id = account.home_account_id.clone();

				self.save_account(account);
				self.0.write().active = Some(id);
			},
			None => self.0.write().active = None,
		}
	}

	/// Persists or replaces a token record under its account + scope key.
	pub fn save_record(&self, record: TokenRecord) {
		let key = CacheKey::new(&record.account, &record.scope);

		self.0.write().tokens.insert(key, record);
	}

	/// Fetches the record for an account + resource scope pair.
	pub fn fetch_record(&self, account: &AccountId, scope: &ScopeSet) -> Option<TokenRecord> {
		self.0.read().tokens.get(&CacheKey::new(account, scope)).cloned()
	}

	/// Drops the record for an account + resource scope pair.
	pub fn remove_record(&self, account: &AccountId, scope: &ScopeSet) -> Option<TokenRecord> {
		self.0.write().tokens.remove(&CacheKey::new(account, scope))
	}

	/// Returns any refresh token cached for the account.
	///
	/// Entra refresh tokens are not bound to the resource they were first issued for, so a token
	/// cached under one scope key can redeem tokens for another.
	pub fn refresh_token(&self, account: &AccountId) -> Option<TokenSecret> {
		self.0
			.read()
			.tokens
			.iter()
			.filter(|(key, _)| &key.account == account)
			.find_map(|(_, record)| record.refresh_token.clone())
	}

	/// Forgets an account together with all of its tokens.
	///
	/// Returns `true` when the account was cached. The active selection is cleared when it
	/// pointed at the removed account.
	pub fn remove_account(&self, id: &AccountId) -> bool {
		let mut state = self.0.write();
		let before = state.accounts.len();

		state.accounts.retain(|account| &account.home_account_id != id);
		state.tokens.retain(|key, _| &key.account != id);

		if state.active.as_ref() == Some(id) {
			state.active = None;
		}

		state.accounts.len() != before
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::TenantId;

	fn account(oid: &str) -> Account {
		Account {
			home_account_id: AccountId::from_parts(oid, "tid").expect("Account id should build."),
			local_account_id: oid.into(),
			tenant_id: TenantId::new("tid").expect("Tenant id should build."),
			username: format!("{oid}@contoso.com"),
			name: None,
			login_hint: None,
		}
	}

	fn record(account: &Account, scope: &ScopeSet, token: &str) -> TokenRecord {
		TokenRecord::builder(account.home_account_id.clone(), scope.clone())
			.access_token(token)
			.expires_in(Duration::HOUR)
			.build()
			.expect("Record fixture should build.")
	}

	#[test]
	fn accounts_keep_sign_in_order_and_replace_in_place() {
		let cache = SessionCache::default();
		let mut first = account("a");

		cache.save_account(first.clone());
		cache.save_account(account("b"));

		first.name = Some("Renamed".into());

		cache.save_account(first);

		let accounts = cache.accounts();

		assert_eq!(accounts.len(), 2);
		assert_eq!(accounts[0].name.as_deref(), Some("Renamed"));
		assert_eq!(accounts[1].local_account_id, "b");
	}

	#[test]
	fn scope_keys_ignore_ordering() {
		let cache = SessionCache::default();
		let user = account("a");
		let written = ScopeSet::new(["api://x/write", "api://x/read"]).expect("Scope fixture.");
		let lookup = ScopeSet::new(["api://x/read", "api://x/write"]).expect("Scope fixture.");

		cache.save_record(record(&user, &written, "token-1"));

		let hit = cache.fetch_record(&user.home_account_id, &lookup).expect("Record should hit.");

		assert_eq!(hit.access_token.expose(), "token-1");
	}

	#[test]
	fn refresh_token_is_found_under_any_scope_key() {
		let cache = SessionCache::default();
		let user = account("a");
		let first = ScopeSet::new(["api://x/read"]).expect("Scope fixture.");
		let record = TokenRecord::builder(user.home_account_id.clone(), first)
			.access_token("token-1")
			.refresh_token("refresh-1")
			.expires_in(Duration::HOUR)
			.build()
			.expect("Record fixture should build.");

		assert!(cache.refresh_token(&user.home_account_id).is_none());

		cache.save_record(record);

		assert_eq!(
			cache.refresh_token(&user.home_account_id).as_ref().map(TokenSecret::expose),
			Some("refresh-1")
		);
		assert!(cache.refresh_token(&account("b").home_account_id).is_none());
	}

	#[test]
	fn removing_account_drops_tokens_and_active_selection() {
		let cache = SessionCache::default();
		let (a, b) = (account("a"), account("b"));
		let scope = ScopeSet::new(["api://x/read"]).expect("Scope fixture.");

		cache.set_active_account(Some(a.clone()));
		cache.save_account(b.clone());
		cache.save_record(record(&a, &scope, "token-a"));
		cache.save_record(record(&b, &scope, "token-b"));

		assert!(cache.remove_account(&a.home_account_id));
		assert!(!cache.remove_account(&a.home_account_id));
		assert!(cache.active_account().is_none());
		assert!(cache.fetch_record(&a.home_account_id, &scope).is_none());
		assert!(cache.fetch_record(&b.home_account_id, &scope).is_some());
	}
}
