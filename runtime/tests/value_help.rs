use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use odata_mockdata::{
    service::{ExternalServiceProvider, ODataResponse},
    value_help::{
        CODE_LIST_TARGET, ExternalService, ExternalServiceReference, PassState, RequestCache,
        ValueHelpOptions, ValueHelpSession, fetch_entity_data,
    },
};
use serde_json::json;

const SERVICE_PATH: &str = "/sap/opu/odata4/sap/zui_travel/srvd/sap/ztravel/0001/";
const AGENCY_PATH: &str = "/sap/opu/odata4/sap/zui_travel/srvd_f4/sap/i_agency/0001/";
const CUSTOMER_PATH: &str = "/sap/opu/odata4/sap/zui_travel/srvd_f4/sap/i_customer/0001/";
const CUSTOMER_VH_PATH: &str = "/sap/opu/odata4/sap/zui_travel/srvd_f4/sap/i_customer_vh/0001/";
const COMMON_PATH: &str = "/sap/opu/odata4/sap/zui_travel/default/iwbep/common/0001/";

const MAIN_METADATA: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="com.sap.gateway.srvd.ztravel.v0001" Alias="SAP__self" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityContainer Name="Container">
        <EntitySet Name="Travel" EntityType="SAP__self.TravelType"/>
      </EntityContainer>
      <Annotations Target="SAP__self.TravelType/AgencyID">
        <Annotation Term="SAP__common.ValueListReferences">
          <Collection>
            <String>../../../../srvd_f4/sap/i_agency/0001/$metadata</String>
          </Collection>
        </Annotation>
      </Annotations>
      <Annotations Target="SAP__self.TravelType/CustomerID">
        <Annotation Term="SAP__common.ValueListReferences">
          <Collection>
            <String>../../../../srvd_f4/sap/i_customer/0001/$metadata</String>
            <String>../../../../srvd_f4/sap/i_customer_vh/0001/$metadata</String>
          </Collection>
        </Annotation>
      </Annotations>
      <Annotations Target="SAP__self.Container">
        <Annotation Term="SAP__CodeList.CurrencyCodes">
          <Record>
            <PropertyValue Property="Url" String="../../../../default/iwbep/common/0001/$metadata"/>
            <PropertyValue Property="CollectionPath" String="Currencies"/>
          </Record>
        </Annotation>
        <Annotation Term="SAP__CodeList.UnitsOfMeasure">
          <Record>
            <PropertyValue Property="Url" String="../../../../default/iwbep/common/0001/$metadata"/>
            <PropertyValue Property="CollectionPath" String="UnitsOfMeasure"/>
          </Record>
        </Annotation>
      </Annotations>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

fn service_metadata(entity_sets: &[&str]) -> String {
    let sets: String = entity_sets
        .iter()
        .map(|name| format!(r#"<EntitySet Name="{name}" EntityType="SAP__self.{name}Type"/>"#))
        .collect();
    format!(
        r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="vh" Alias="SAP__self" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityContainer Name="Container">{sets}</EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#
    )
}

/// Serves canned metadata and rows, counting every request it receives.
struct FakeProvider {
    metadata: HashMap<&'static str, String>,
    failing_sets: Vec<&'static str>,
    metadata_requests: Mutex<Vec<Vec<ExternalServiceReference>>>,
    entity_requests: Mutex<HashMap<(String, String), usize>>,
}

impl FakeProvider {
    fn new() -> Self {
        let metadata = HashMap::from([
            (AGENCY_PATH, service_metadata(&["Agency"])),
            (CUSTOMER_PATH, service_metadata(&["Customer"])),
            (CUSTOMER_VH_PATH, service_metadata(&["Customer", "Passenger"])),
            (COMMON_PATH, service_metadata(&["Currencies", "UnitsOfMeasure"])),
        ]);
        Self {
            metadata,
            failing_sets: vec!["Passenger"],
            metadata_requests: Mutex::new(Vec::new()),
            entity_requests: Mutex::new(HashMap::new()),
        }
    }

    fn metadata_requests(&self) -> Vec<Vec<ExternalServiceReference>> {
        self.metadata_requests.lock().unwrap().clone()
    }

    fn entity_requests(&self, service_path: &str, entity_set: &str) -> usize {
        self.entity_requests
            .lock()
            .unwrap()
            .get(&(service_path.to_string(), entity_set.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn total_entity_requests(&self) -> usize {
        self.entity_requests.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl ExternalServiceProvider for FakeProvider {
    async fn fetch_external_services(
        &self,
        references: &[ExternalServiceReference],
    ) -> Result<Vec<ExternalService>> {
        self.metadata_requests
            .lock()
            .unwrap()
            .push(references.to_vec());

        let mut services: Vec<ExternalService> = Vec::new();
        for reference in references {
            let target = reference.target_entity();
            if services.iter().any(|s| s.matches(reference)) {
                continue;
            }
            let metadata = self
                .metadata
                .get(reference.path.as_str())
                .cloned()
                .ok_or_else(|| anyhow!("no metadata for {}", reference.path))?;
            services.push(ExternalService {
                kind: reference.kind,
                target: target.to_string(),
                path: reference.path.clone(),
                metadata,
                entity_data: Vec::new(),
            });
        }
        Ok(services)
    }

    async fn fetch_entity_set(
        &self,
        service_path: &str,
        entity_set: &str,
        top: usize,
    ) -> Result<ODataResponse> {
        *self
            .entity_requests
            .lock()
            .unwrap()
            .entry((service_path.to_string(), entity_set.to_string()))
            .or_default() += 1;

        if self.failing_sets.iter().any(|name| *name == entity_set) {
            return Err(anyhow!("503 Service Unavailable for {entity_set}"));
        }
        let rows: Vec<_> = (0..top.min(2))
            .map(|i| json!({ "ID": format!("{entity_set}-{i}") }))
            .collect();
        Ok(ODataResponse::new(json!({ "value": rows })))
    }
}

fn options() -> ValueHelpOptions {
    ValueHelpOptions {
        top: 2,
        ..ValueHelpOptions::default()
    }
}

fn new_session(provider: &Arc<FakeProvider>, cache: &RequestCache) -> ValueHelpSession {
    ValueHelpSession::new(provider.clone(), cache.clone(), options())
}

fn data_sets(service: &ExternalService) -> Vec<&str> {
    service
        .entity_data
        .iter()
        .map(|data| data.entity_set_name.as_str())
        .collect()
}

#[tokio::test]
async fn full_pass_fetches_each_entity_set_once() -> anyhow::Result<()> {
    let provider = Arc::new(FakeProvider::new());
    let cache = RequestCache::new();
    let mut session = new_session(&provider, &cache);
    assert_eq!(session.state(), PassState::Idle);

    let choices = session.discover(SERVICE_PATH, MAIN_METADATA)?.to_vec();
    assert_eq!(session.state(), PassState::Discovering);
    let groups: Vec<(&str, &str)> = choices
        .iter()
        .map(|c| (c.service_path.as_str(), c.target.as_str()))
        .collect();
    assert_eq!(
        groups,
        vec![
            (COMMON_PATH, CODE_LIST_TARGET),
            (AGENCY_PATH, "TravelType"),
            (CUSTOMER_PATH, "TravelType"),
            (CUSTOMER_VH_PATH, "TravelType"),
        ]
    );

    session.select(&choices).await?;
    assert_eq!(session.state(), PassState::FetchingMetadata);
    assert_eq!(session.services().len(), 4);
    assert_eq!(provider.metadata_requests().len(), 1);

    session.fetch_entity_data().await?;
    assert_eq!(session.state(), PassState::Done);
    assert_eq!(provider.total_entity_requests(), 6);

    let by_path: HashMap<&str, &ExternalService> = session
        .services()
        .iter()
        .map(|service| (service.path.as_str(), service))
        .collect();
    assert_eq!(data_sets(by_path[COMMON_PATH]), vec!["Currencies", "UnitsOfMeasure"]);
    assert_eq!(data_sets(by_path[AGENCY_PATH]), vec!["Agency"]);
    assert_eq!(data_sets(by_path[CUSTOMER_VH_PATH]), vec!["Customer"]);
    assert_eq!(by_path[AGENCY_PATH].entity_data[0].items.len(), 2);
    Ok(())
}

#[tokio::test]
async fn failed_request_is_released_and_retried_next_pass() -> anyhow::Result<()> {
    let provider = Arc::new(FakeProvider::new());
    let cache = RequestCache::new();
    let mut session = new_session(&provider, &cache);

    let choices = session.discover(SERVICE_PATH, MAIN_METADATA)?.to_vec();
    session.select(&choices).await?;
    session.fetch_entity_data().await?;

    assert!(cache.contains(CUSTOMER_VH_PATH, "Customer").await);
    assert!(!cache.contains(CUSTOMER_VH_PATH, "Passenger").await);
    assert_eq!(provider.entity_requests(CUSTOMER_VH_PATH, "Passenger"), 1);

    session.restart();
    assert_eq!(session.state(), PassState::Idle);
    assert!(session.services().is_empty());

    let choices = session.discover(SERVICE_PATH, MAIN_METADATA)?.to_vec();
    session.select(&choices).await?;
    session.fetch_entity_data().await?;

    assert_eq!(provider.entity_requests(CUSTOMER_VH_PATH, "Passenger"), 2);
    assert_eq!(provider.entity_requests(CUSTOMER_VH_PATH, "Customer"), 1);
    assert_eq!(provider.entity_requests(AGENCY_PATH, "Agency"), 1);
    assert!(
        session
            .services()
            .iter()
            .all(|service| service.entity_data.is_empty())
    );
    Ok(())
}

#[tokio::test]
async fn select_only_fetches_new_references() -> anyhow::Result<()> {
    let provider = Arc::new(FakeProvider::new());
    let cache = RequestCache::new();
    let mut session = new_session(&provider, &cache);
    let choices = session.discover(SERVICE_PATH, MAIN_METADATA)?.to_vec();

    session.select(&choices[..1]).await?;
    assert_eq!(session.services().len(), 1);

    session.select(&choices[..2]).await?;
    assert_eq!(session.services().len(), 2);

    session.select(&choices[..2]).await?;
    assert_eq!(session.services().len(), 2);

    let requests = provider.metadata_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].len(), 2);
    assert!(requests[0].iter().all(|r| r.path == COMMON_PATH));
    assert_eq!(requests[1].len(), 1);
    assert_eq!(requests[1][0].path, AGENCY_PATH);
    Ok(())
}

#[tokio::test]
async fn scoped_reset_only_refetches_that_service() -> anyhow::Result<()> {
    let provider = Arc::new(FakeProvider::new());
    let cache = RequestCache::new();
    let mut session = new_session(&provider, &cache);
    let choices = session.discover(SERVICE_PATH, MAIN_METADATA)?.to_vec();
    session.select(&choices).await?;
    session.fetch_entity_data().await?;

    session.reset_cache_for(COMMON_PATH).await;
    assert!(cache.entity_sets(COMMON_PATH).await.is_empty());
    session.fetch_entity_data().await?;

    assert_eq!(provider.entity_requests(COMMON_PATH, "Currencies"), 2);
    assert_eq!(provider.entity_requests(COMMON_PATH, "UnitsOfMeasure"), 2);
    assert_eq!(provider.entity_requests(AGENCY_PATH, "Agency"), 1);

    session.reset_cache().await;
    assert!(cache.entity_sets(AGENCY_PATH).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn shared_cache_deduplicates_concurrent_services() -> anyhow::Result<()> {
    let provider = FakeProvider::new();
    let cache = RequestCache::new();
    let references: Vec<ExternalServiceReference> = ["Currencies", "UnitsOfMeasure"]
        .iter()
        .map(|collection| ExternalServiceReference {
            kind: odata_mockdata::value_help::ReferenceKind::CodeList,
            target: collection.to_string(),
            value: "../common/$metadata".to_string(),
            path: COMMON_PATH.to_string(),
        })
        .collect();

    let mut first = provider.fetch_external_services(&references).await?;
    let mut second = first.clone();
    assert_eq!(first.len(), 1);

    fetch_entity_data(&provider, &cache, &mut first, 5).await;
    fetch_entity_data(&provider, &cache, &mut second, 5).await;

    assert_eq!(provider.entity_requests(COMMON_PATH, "Currencies"), 1);
    assert_eq!(provider.entity_requests(COMMON_PATH, "UnitsOfMeasure"), 1);
    assert_eq!(data_sets(&first[0]), vec!["Currencies", "UnitsOfMeasure"]);
    assert!(second[0].entity_data.is_empty());
    Ok(())
}

#[tokio::test]
async fn fetching_before_discovery_is_an_error() {
    let provider = Arc::new(FakeProvider::new());
    let mut session = new_session(&provider, &RequestCache::new());
    assert!(session.fetch_entity_data().await.is_err());
}

const SHARED_SERVICE_METADATA: &str = r#"<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="com.sap.gateway.srvd.ztravel.v0001" Alias="SAP__self" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <Annotations Target="SAP__self.TravelType/AgencyID">
        <Annotation Term="SAP__common.ValueListReferences">
          <Collection>
            <String>../../../../srvd_f4/sap/i_agency/0001/$metadata</String>
          </Collection>
        </Annotation>
      </Annotations>
      <Annotations Target="SAP__self.BookingType/AgencyID">
        <Annotation Term="SAP__common.ValueListReferences">
          <Collection>
            <String>../../../../srvd_f4/sap/i_agency/0001/$metadata</String>
          </Collection>
        </Annotation>
      </Annotations>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

#[tokio::test]
async fn targets_sharing_a_service_fetch_its_entity_sets_once() -> anyhow::Result<()> {
    let provider = Arc::new(FakeProvider::new());
    let cache = RequestCache::new();
    let mut session = new_session(&provider, &cache);

    let choices = session
        .discover(SERVICE_PATH, SHARED_SERVICE_METADATA)?
        .to_vec();
    let targets: Vec<(&str, &str)> = choices
        .iter()
        .map(|c| (c.service_path.as_str(), c.target.as_str()))
        .collect();
    assert_eq!(
        targets,
        vec![(AGENCY_PATH, "BookingType"), (AGENCY_PATH, "TravelType")]
    );

    session.select(&choices).await?;
    assert_eq!(session.services().len(), 2);
    session.fetch_entity_data().await?;

    assert_eq!(provider.entity_requests(AGENCY_PATH, "Agency"), 1);
    assert_eq!(provider.total_entity_requests(), 1);
    let holders: Vec<&ExternalService> = session
        .services()
        .iter()
        .filter(|service| !service.entity_data.is_empty())
        .collect();
    assert_eq!(holders.len(), 1);
    assert_eq!(data_sets(holders[0]), vec!["Agency"]);
    Ok(())
}
