/// How the gateway treats one named operation of the workbench query API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationPolicy {
    pub disabled: bool,
    pub handle_locally: bool,
    pub rewrite_response: bool,
    pub preprocess: bool,
}

impl OperationPolicy {
    const DISABLED: Self = Self {
        disabled: true,
        handle_locally: false,
        rewrite_response: false,
        preprocess: false,
    };

    const fn new(handle_locally: bool, rewrite_response: bool, preprocess: bool) -> Self {
        Self {
            disabled: false,
            handle_locally,
            rewrite_response,
            preprocess,
        }
    }
}

// Connection management belongs to the reconciler; users may not create or
// edit connections from the workbench UI.
static POLICIES: &[(&str, OperationPolicy)] = &[
    ("createConnection", OperationPolicy::DISABLED),
    ("updateConnection", OperationPolicy::DISABLED),
    ("deleteConnection", OperationPolicy::DISABLED),
    ("copyConnectionFromNode", OperationPolicy::DISABLED),
    ("createConnectionFromTemplate", OperationPolicy::DISABLED),
    ("asyncSqlExecuteQuery", OperationPolicy::new(true, false, true)),
    ("getSqlExecuteTaskResults", OperationPolicy::new(true, true, false)),
    ("asyncReadDataFromContainer", OperationPolicy::new(false, false, true)),
    ("navNodeChildren", OperationPolicy::new(false, false, true)),
    ("serverConfig", OperationPolicy::new(false, true, false)),
    ("authLogout", OperationPolicy::new(true, false, false)),
];

/// Policy for `operation`; `None` means pass the request through untouched
pub fn policy_for(operation: &str) -> Option<OperationPolicy> {
    POLICIES
        .iter()
        .find(|(name, _)| *name == operation)
        .map(|(_, policy)| *policy)
}
