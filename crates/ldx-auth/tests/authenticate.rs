//! End-to-end authentication pipeline tests against the in-memory backend.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ldx_auth::{
    AuthError, AuthenticationCriteria, AuthenticationRequest, AuthenticationResponse,
    AuthenticationResponseHandler, AuthenticationResultHandler, Authenticator, Authorization,
    BindAuthenticationHandler, CompareAuthenticationHandler, CompareAuthorizationHandler,
    DigestScheme, DnResolver, EntryResolver, FilterAuthorizationHandler,
    PersistentSearchDnResolver, PooledBindAuthenticationHandler, SearchDnResolver,
    SearchEntryResolver,
};
use ldx_model::credential::Credential;
use ldx_model::entry::LdapEntry;
use ldx_model::request::{BindRequest, ReturnAttributes};
use ldx_model::result_code::ResultCode;
use ldx_provider::connection::{Connection, ConnectionFactory};
use ldx_provider::error::RetryPolicy;
use ldx_provider::listener::ConnectionListener;
use ldx_provider::pool::{ConnectionPool, PoolConfig};
use ldx_provider_mem::{Directory, MemConnectionFactory};

const PEOPLE: &str = "ou=people,dc=example,dc=org";
const JDOE: &str = "uid=jdoe,ou=people,dc=example,dc=org";

fn seeded_directory() -> Directory {
    let directory = Directory::new();
    directory.add_entry(
        LdapEntry::new(PEOPLE)
            .with_attribute("objectClass", "organizationalUnit")
            .with_attribute("ou", "people"),
    );
    directory.add_entry(
        LdapEntry::new(JDOE)
            .with_attribute("objectClass", "person")
            .with_attribute("uid", "jdoe")
            .with_attribute("cn", "John Doe")
            .with_attribute("mail", "jdoe@example.org")
            .with_attribute("employeeType", "staff")
            .with_attribute("userPassword", "secret"),
    );
    directory
}

fn uid_resolver(factory: MemConnectionFactory) -> SearchDnResolver<MemConnectionFactory> {
    SearchDnResolver::new(factory, PEOPLE, "(uid={0})")
}

#[tokio::test]
async fn bind_authentication_resolves_and_fetches_the_entry() {
    let factory = MemConnectionFactory::new(seeded_directory());
    let authenticator = Authenticator::new(
        uid_resolver(factory.clone()),
        BindAuthenticationHandler::new(factory),
    )
    .entry_resolver(
        SearchEntryResolver::new().return_attributes(ReturnAttributes::named(["cn", "mail"])),
    );

    let response = authenticator
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("secret")))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.result_code, ResultCode::Success);
    assert_eq!(response.dn.as_deref(), Some(JDOE));
    let entry = response.entry.unwrap();
    assert_eq!(entry.get_attr("cn"), Some("John Doe"));
    assert_eq!(entry.get_attr("mail"), Some("jdoe@example.org"));
    assert!(!entry.has_attr("uid"));
}

#[tokio::test]
async fn wrong_credential_is_a_negative_response() {
    let factory = MemConnectionFactory::new(seeded_directory());
    let authenticator = Authenticator::new(
        uid_resolver(factory.clone()),
        BindAuthenticationHandler::new(factory),
    );

    let response = authenticator
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("wrong")))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.result_code, ResultCode::InvalidCredentials);
    assert_eq!(response.dn.as_deref(), Some(JDOE));
    assert!(response.entry.is_none());
}

#[derive(Default)]
struct OpenCounter {
    opened: AtomicUsize,
}

impl ConnectionListener for OpenCounter {
    fn connection_opened(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn unknown_user_never_reaches_the_handler() {
    let factory = MemConnectionFactory::new(seeded_directory());
    let counter = Arc::new(OpenCounter::default());
    factory.listeners().register(Arc::clone(&counter) as Arc<dyn ConnectionListener>);

    let authenticator = Authenticator::new(
        uid_resolver(factory.clone()),
        BindAuthenticationHandler::new(factory),
    );

    let response = authenticator
        .authenticate(&AuthenticationRequest::new("ghost", Credential::from("whatever")))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.result_code, ResultCode::NoSuchObject);
    assert!(response.dn.is_none());
    // Only the resolution search opened a connection; no bind was attempted.
    assert_eq!(counter.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_credential_skips_the_directory() {
    let directory = seeded_directory();
    let factory = MemConnectionFactory::new(directory.clone());
    let authenticator = Authenticator::new(
        uid_resolver(factory.clone()),
        BindAuthenticationHandler::new(factory),
    );

    let response = authenticator
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("")))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.result_code, ResultCode::InvalidCredentials);
    assert_eq!(directory.search_count(), 0);
}

#[tokio::test]
async fn ambiguous_resolution_is_an_error_unless_allowed() {
    let directory = seeded_directory();
    directory.add_entry(
        LdapEntry::new("cn=double,ou=people,dc=example,dc=org")
            .with_attribute("objectClass", "person")
            .with_attribute("uid", "jdoe")
            .with_attribute("userPassword", "secret"),
    );
    let factory = MemConnectionFactory::new(directory);

    let strict = uid_resolver(factory.clone());
    let err = strict.resolve("jdoe").await.unwrap_err();
    assert!(matches!(err, AuthError::AmbiguousDn(user) if user == "jdoe"));

    let lenient = uid_resolver(factory.clone()).allow_multiple_dns();
    let authenticator =
        Authenticator::new(lenient, BindAuthenticationHandler::new(factory));
    let response = authenticator
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("secret")))
        .await
        .unwrap();
    assert!(response.success);
    let dn = response.dn.unwrap();
    assert!(dn == JDOE || dn == "cn=double,ou=people,dc=example,dc=org");
}

#[tokio::test]
async fn compare_handler_verifies_a_stored_digest() {
    let directory = Directory::new();
    directory.add_entry(
        LdapEntry::new(JDOE)
            .with_attribute("objectClass", "person")
            .with_attribute("uid", "jdoe")
            .with_attribute("userPassword", "{SHA}W6ph5Mm5Pz8GgiULbPgzG37mj9g="),
    );
    let factory = MemConnectionFactory::new(directory);
    let authenticator = Authenticator::new(
        uid_resolver(factory.clone()),
        CompareAuthenticationHandler::new(factory).scheme(DigestScheme::Sha1),
    );

    let accepted = authenticator
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("password")))
        .await
        .unwrap();
    assert!(accepted.success);

    let rejected = authenticator
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("nope")))
        .await
        .unwrap();
    assert!(!rejected.success);
    assert_eq!(rejected.result_code, ResultCode::CompareFalse);
}

#[tokio::test]
async fn resolution_retries_on_retryable_failures() {
    let directory = seeded_directory();
    directory.fail_searches([ResultCode::Busy]);
    let factory = MemConnectionFactory::new(directory.clone());

    let resolver = uid_resolver(factory.clone())
        .retry_policy(RetryPolicy { attempts: 2, backoff: Duration::ZERO });
    let authenticator =
        Authenticator::new(resolver, BindAuthenticationHandler::new(factory));

    let response = authenticator
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("secret")))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(directory.search_count(), 2);
}

#[tokio::test]
async fn authorization_handlers_gate_the_outcome() {
    let directory = seeded_directory();
    directory.add_entry(
        LdapEntry::new("cn=admins,ou=groups,dc=example,dc=org")
            .with_attribute("objectClass", "groupOfNames")
            .with_attribute("member", JDOE),
    );
    let factory = MemConnectionFactory::new(directory);

    let denied = Authenticator::new(
        uid_resolver(factory.clone()),
        BindAuthenticationHandler::new(factory.clone()),
    )
    .authorization_handler(Authorization::Compare(CompareAuthorizationHandler::new(
        "employeeType",
        "admin",
    )));
    let response = denied
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("secret")))
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.result_code, ResultCode::InsufficientAccessRights);

    let allowed = Authenticator::new(
        uid_resolver(factory.clone()),
        BindAuthenticationHandler::new(factory),
    )
    .authorization_handler(Authorization::Compare(CompareAuthorizationHandler::new(
        "employeeType",
        "staff",
    )))
    .authorization_handler(Authorization::Filter(FilterAuthorizationHandler::new(
        "ou=groups,dc=example,dc=org",
        "(member={0})",
    )));
    let response = allowed
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("secret")))
        .await
        .unwrap();
    assert!(response.success);
}

#[derive(Default)]
struct RecordingResultHandler {
    calls: AtomicUsize,
    last_success: AtomicBool,
}

impl AuthenticationResultHandler for RecordingResultHandler {
    fn handle(&self, _criteria: &AuthenticationCriteria, success: bool) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_success.store(success, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ScrubbingResponseHandler {
    calls: AtomicUsize,
}

impl AuthenticationResponseHandler for ScrubbingResponseHandler {
    fn handle(&self, response: &mut AuthenticationResponse) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        response.diagnostic_message = "scrubbed".into();
    }
}

#[tokio::test]
async fn result_and_response_handlers_run_once() {
    let factory = MemConnectionFactory::new(seeded_directory());
    let result_handler = Arc::new(RecordingResultHandler::default());
    let response_handler = Arc::new(ScrubbingResponseHandler::default());

    let authenticator = Authenticator::new(
        uid_resolver(factory.clone()),
        BindAuthenticationHandler::new(factory),
    )
    .result_handler(Arc::clone(&result_handler) as Arc<dyn AuthenticationResultHandler>)
    .response_handler(Arc::clone(&response_handler) as Arc<dyn AuthenticationResponseHandler>);

    let response = authenticator
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("secret")))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.diagnostic_message, "scrubbed");
    assert_eq!(result_handler.calls.load(Ordering::SeqCst), 1);
    assert!(result_handler.last_success.load(Ordering::SeqCst));
    assert_eq!(response_handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn response_handlers_also_run_on_short_circuits() {
    let factory = MemConnectionFactory::new(seeded_directory());
    let response_handler = Arc::new(ScrubbingResponseHandler::default());

    let authenticator = Authenticator::new(
        uid_resolver(factory.clone()),
        BindAuthenticationHandler::new(factory),
    )
    .response_handler(Arc::clone(&response_handler) as Arc<dyn AuthenticationResponseHandler>);

    let response = authenticator
        .authenticate(&AuthenticationRequest::new("ghost", Credential::from("pw")))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.diagnostic_message, "scrubbed");
    assert_eq!(response_handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn entry_resolution_drains_the_search_and_falls_back_to_dn_only() {
    let factory = MemConnectionFactory::new(seeded_directory());
    let mut connection = factory.connection().await.unwrap();
    connection.open(&BindRequest::anonymous()).await.unwrap();

    let resolver = SearchEntryResolver::new();
    let entry = resolver.resolve_entry(JDOE, &mut connection).await.unwrap();
    assert_eq!(entry.get_attr("cn"), Some("John Doe"));

    // A DN that vanished between bind and entry resolution still drains
    // the cursor and yields the DN-only placeholder.
    let missing = "uid=ghost,ou=people,dc=example,dc=org";
    let entry = resolver.resolve_entry(missing, &mut connection).await.unwrap();
    assert_eq!(entry.dn, missing);
    assert!(entry.attributes.is_empty());

    connection.close().await.unwrap();
}

#[tokio::test]
async fn persistent_resolver_requires_initialization() {
    let factory = MemConnectionFactory::new(seeded_directory());
    let resolver = PersistentSearchDnResolver::new(uid_resolver(factory));

    assert!(matches!(resolver.resolve("jdoe").await, Err(AuthError::NotInitialized)));

    resolver.initialize().await.unwrap();
    assert_eq!(resolver.resolve("jdoe").await.unwrap().as_deref(), Some(JDOE));
    assert_eq!(resolver.resolve("ghost").await.unwrap(), None);

    resolver.close().await;
    assert!(matches!(resolver.resolve("jdoe").await, Err(AuthError::NotInitialized)));
}

#[tokio::test]
async fn pooled_bind_handler_authenticates() {
    let factory = MemConnectionFactory::new(seeded_directory());
    let pool = ConnectionPool::new(
        factory.clone(),
        BindRequest::anonymous(),
        PoolConfig::default(),
    )
    .unwrap();

    let authenticator = Authenticator::new(
        uid_resolver(factory),
        PooledBindAuthenticationHandler::new(pool),
    );

    let response = authenticator
        .authenticate(&AuthenticationRequest::new("jdoe", Credential::from("secret")))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.dn.as_deref(), Some(JDOE));
}
