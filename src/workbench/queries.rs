// Query documents sent by the admin client, keyed by the oldest workbench
// release that understands them. Result fields are aliased so every set is
// parsed the same way.

use std::fmt;

use super::error::WorkbenchError;

/// Version probe; valid on every supported release and needs no session
pub const SERVER_VERSION: &str = "query serverConfig { serverConfig { version } }";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WorkbenchVersion(pub u32, pub u32, pub u32);

impl WorkbenchVersion {
    /// Parse the leading `major.minor.patch` of strings like `23.2.5.202311061939`
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().trim_start_matches('v').split(['.', '-', '+']);
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(Self(major, minor, patch))
    }
}

impl fmt::Display for WorkbenchVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

#[derive(Debug)]
pub struct QuerySet {
    pub label: &'static str,
    pub min_version: WorkbenchVersion,
    /// Whether connection mutations take a `projectId` variable
    pub project_scoped: bool,
    pub auth_login: &'static str,
    pub find_user: &'static str,
    pub create_user: &'static str,
    pub set_user_credentials: &'static str,
    pub create_connection: &'static str,
    pub update_connection: &'static str,
    pub delete_connection: &'static str,
    pub grant_connection: &'static str,
    pub user_connections: &'static str,
    pub set_user_connections: &'static str,
}

static LEGACY: QuerySet = QuerySet {
    label: "legacy",
    min_version: WorkbenchVersion(22, 0, 0),
    project_scoped: false,
    auth_login: "mutation authLogin($credentials: Object) { \
        auth: authLogin(provider: \"local\", credentials: $credentials) { authId } }",
    find_user: "query adminUserInfo($userId: ID!) { \
        user: listUsers(userId: $userId) { userId } }",
    create_user: "mutation createUser($userId: ID!) { \
        user: createUser(userId: $userId) { userId } }",
    set_user_credentials: "mutation setUserCredentials($userId: ID!, $password: String!) { \
        setUserCredentials(userId: $userId, providerId: \"local\", credentials: { password: $password }) }",
    create_connection: "mutation createConnection($config: ConnectionConfig!) { \
        connection: createConnection(config: $config) { id } }",
    update_connection: "mutation updateConnection($config: ConnectionConfig!) { \
        connection: updateConnection(config: $config) { id } }",
    delete_connection: "mutation deleteConnection($id: ID!) { \
        deleteConnection(id: $id) }",
    grant_connection: "mutation setConnectionSubjectAccess($connectionId: ID!, $subjects: [ID!]!) { \
        setConnectionSubjectAccess(connectionId: $connectionId, subjects: $subjects) }",
    user_connections: "query getSubjectConnectionAccess($subjectId: ID!) { \
        grants: getSubjectConnectionAccess(subjectId: $subjectId) { connectionId } }",
    set_user_connections: "mutation setSubjectConnectionAccess($subjectId: ID!, $connectionIds: [ID!]!) { \
        setSubjectConnectionAccess(subjectId: $subjectId, connections: $connectionIds) }",
};

static PROJECT_SCOPED: QuerySet = QuerySet {
    label: "project-scoped",
    min_version: WorkbenchVersion(23, 1, 0),
    project_scoped: true,
    auth_login: "mutation authLogin($credentials: Object) { \
        auth: authLogin(provider: \"local\", credentials: $credentials, linkUser: false) { authStatus } }",
    find_user: "query adminUserInfo($userId: ID!) { \
        user: adminUserInfo(userId: $userId) { userId } }",
    create_user: "mutation createUser($userId: ID!) { \
        user: createUser(userId: $userId, enabled: true) { userId } }",
    set_user_credentials: "mutation setUserCredentials($userId: ID!, $password: String!) { \
        setUserCredentials(userId: $userId, providerId: \"local\", credentials: { password: $password }) }",
    create_connection: "mutation createConnection($projectId: ID!, $config: ConnectionConfig!) { \
        connection: createConnection(projectId: $projectId, config: $config) { id } }",
    update_connection: "mutation updateConnection($projectId: ID!, $config: ConnectionConfig!) { \
        connection: updateConnection(projectId: $projectId, config: $config) { id } }",
    delete_connection: "mutation deleteConnection($projectId: ID!, $id: ID!) { \
        deleteConnection(projectId: $projectId, id: $id) }",
    grant_connection: "mutation addConnectionsAccess($projectId: ID!, $connectionId: ID!, $subjects: [ID!]!) { \
        addConnectionsAccess(projectId: $projectId, connectionIds: [$connectionId], subjects: $subjects) }",
    user_connections: "query getSubjectConnectionAccess($subjectId: ID!) { \
        grants: getSubjectConnectionAccess(subjectId: $subjectId) { connectionId } }",
    set_user_connections: "mutation setSubjectConnectionAccess($projectId: ID!, $subjectId: ID!, $connectionIds: [ID!]!) { \
        setSubjectConnectionAccess(projectId: $projectId, subjectId: $subjectId, connectionIds: $connectionIds) }",
};

/// Sorted by ascending minimum version
static QUERY_TABLE: [&QuerySet; 2] = [&LEGACY, &PROJECT_SCOPED];

/// Highest query set whose minimum version does not exceed `version`
pub fn select(version: WorkbenchVersion) -> Result<&'static QuerySet, WorkbenchError> {
    QUERY_TABLE
        .iter()
        .rev()
        .find(|set| set.min_version <= version)
        .copied()
        .ok_or_else(|| WorkbenchError::UnsupportedVersion(version.to_string()))
}
