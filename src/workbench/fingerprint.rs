use sha2::{Digest, Sha256};

use crate::platform::DbService;

/// Digest of the connection-relevant fields of a DB service.
///
/// The password enters only as its own digest. Extra parameters are held in a
/// `BTreeMap`, so their serialization is stable regardless of insertion order.
pub fn fingerprint(service: &DbService) -> String {
    let password_digest = format!("{:x}", Sha256::digest(service.admin_password.as_bytes()));
    let material = serde_json::json!([
        service.id,
        service.host,
        service.port,
        service.admin_user,
        password_digest,
        service.additional_params,
    ]);
    format!("{:x}", Sha256::digest(material.to_string().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> DbService {
        DbService {
            id: "S1".into(),
            name: "orders".into(),
            db_type: "MySQL".into(),
            host: "10.0.0.5".into(),
            port: 3306,
            admin_user: "root".into(),
            admin_password: "pw".into(),
            additional_params: [("charset".to_string(), "utf8mb4".to_string())].into_iter().collect(),
            audit_enabled: false,
            active: true,
        }
    }

    #[test]
    fn equal_inputs_give_equal_digests() {
        assert_eq!(fingerprint(&base()), fingerprint(&base()));
        assert_eq!(fingerprint(&base()).len(), 64);
    }

    #[test]
    fn every_connection_field_changes_the_digest() {
        let original = fingerprint(&base());
        let variants: Vec<Box<dyn Fn(&mut DbService)>> = vec![
            Box::new(|s| s.id = "S2".into()),
            Box::new(|s| s.host = "10.0.0.6".into()),
            Box::new(|s| s.port = 3307),
            Box::new(|s| s.admin_user = "admin".into()),
            Box::new(|s| s.admin_password = "pw2".into()),
            Box::new(|s| {
                s.additional_params.insert("ssl".into(), "true".into());
            }),
            Box::new(|s| {
                s.additional_params.insert("charset".into(), "latin1".into());
            }),
        ];
        for (i, change) in variants.iter().enumerate() {
            let mut service = base();
            change(&mut service);
            assert_ne!(fingerprint(&service), original, "variant {i} kept the digest");
        }
    }

    #[test]
    fn display_only_fields_do_not_matter() {
        let mut service = base();
        service.name = "renamed".into();
        service.audit_enabled = true;
        assert_eq!(fingerprint(&service), fingerprint(&base()));
    }
}
