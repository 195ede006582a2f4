use bson::{Bson, Document, doc};

use crate::error::Result;
use crate::profile::DeploymentProfile;

/// `hello`/`isMaster`: shape depends only on the deployment profile.
pub fn hello(profile: DeploymentProfile) -> Result<Document> {
    let mut body = doc! {
        "ismaster": true,
        "isWritablePrimary": true,
        "maxBsonObjectSize": 16_777_216i32,
        "maxMessageSizeBytes": 48_000_000i32,
        "maxWriteBatchSize": 100_000i32,
        "localTime": bson::DateTime::now(),
        "maxWireVersion": 21i32,
        "minWireVersion": 0i32,
        "readOnly": false,
    };
    if let DeploymentProfile::SingleNodeReplicaSet = profile {
        body.insert("setName", "fauxdb-rs");
        body.insert("setVersion", 1i32);
        body.insert("hosts", Bson::Array(vec![Bson::String("localhost:27017".into())]));
        body.insert("primary", "localhost:27017");
        body.insert(
            "topologyVersion",
            doc! { "processId": bson::oid::ObjectId::new(), "counter": 0i64 },
        );
    }
    Ok(body)
}

pub fn build_info() -> Result<Document> {
    Ok(doc! {
        "version": "7.0.0-fauxdb",
        "versionArray": [7i32, 0i32, 0i32, 0i32],
        "bits": 64i32,
        "maxBsonObjectSize": 16_777_216i32,
    })
}

/// `getParameter`: the core never actually holds server parameters, so every
/// requested name simply echoes back as unset. Drivers mostly probe this for
/// feature-flag parameters during handshake and tolerate an empty body.
pub fn get_parameter(_command: &Document) -> Result<Document> {
    Ok(Document::new())
}
