#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{DeleteParams, ListParams, PatchParams, PostParams};
use kube::error::ErrorResponse;
use kube::ResourceExt;
use rekon_kubehub::{Dependents, KindClient, Page};
use rekon_resources::ManagedKind;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Get(String),
    List(Option<String>),
    Patch(String),
    Create(String),
    Replace(String),
    Delete(String),
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Patch(_) | Call::Create(_) | Call::Replace(_) | Call::Delete(_))
    }
}

pub fn api_err(code: u16) -> kube::Error {
    let reason = match code {
        404 => "NotFound",
        409 => "Conflict",
        _ => "InternalError",
    };
    kube::Error::Api(ErrorResponse {
        status: "Failure".into(),
        message: format!("stub {reason}"),
        reason: reason.into(),
        code,
    })
}

struct State<K> {
    objects: BTreeMap<String, K>,
    calls: Vec<Call>,
    managers: Vec<Option<String>>,
    policies: Vec<String>,
    failures: HashMap<&'static str, VecDeque<u16>>,
    pages: VecDeque<kube::Result<Page<K>>>,
    routes: Vec<(String, Call)>,
    rv: u64,
}

/// In-memory API server recording every call. Handles re-scoped with
/// `in_namespace` share the store and tag their calls with the namespace.
pub struct Stub<K> {
    state: Arc<Mutex<State<K>>>,
    namespace: String,
}

impl<K: ManagedKind> Default for Stub<K> {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                objects: BTreeMap::new(),
                calls: Vec::new(),
                managers: Vec::new(),
                policies: Vec::new(),
                failures: HashMap::new(),
                pages: VecDeque::new(),
                routes: Vec::new(),
                rv: 0,
            })),
            namespace: String::new(),
        }
    }
}

impl<K: ManagedKind> Stub<K> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn client(self: &Arc<Self>) -> Arc<dyn KindClient<K>> {
        self.clone()
    }

    /// Store an object as if someone else created it.
    pub fn seed(&self, mut obj: K) {
        let mut st = self.state.lock().unwrap();
        st.rv += 1;
        let rv = st.rv;
        let meta = obj.meta_mut();
        meta.uid = Some(format!("uid-{rv}"));
        meta.resource_version = Some(rv.to_string());
        st.objects.insert(obj.name_any(), obj);
    }

    pub fn fail_next(&self, op: &'static str, code: u16) {
        self.state.lock().unwrap().failures.entry(op).or_default().push_back(code);
    }

    pub fn push_page(&self, names: &[&str], token: Option<&str>) {
        let items = names
            .iter()
            .map(|n| {
                let mut k = K::default();
                k.meta_mut().name = Some(n.to_string());
                k
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .pages
            .push_back(Ok(Page { items, continue_token: token.map(str::to_string) }));
    }

    /// A page of items that carry their own namespaces.
    pub fn push_namespaced_page(&self, items: &[(&str, &str)], token: Option<&str>) {
        let items = items
            .iter()
            .map(|(ns, n)| {
                let mut k = K::default();
                k.meta_mut().namespace = Some(ns.to_string());
                k.meta_mut().name = Some(n.to_string());
                k
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .pages
            .push_back(Ok(Page { items, continue_token: token.map(str::to_string) }));
    }

    pub fn push_page_error(&self, code: u16) {
        self.state.lock().unwrap().pages.push_back(Err(api_err(code)));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls paired with the namespace of the handle that made them; empty
    /// for the root handle.
    pub fn routes(&self) -> Vec<(String, Call)> {
        self.state.lock().unwrap().routes.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn managers(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().managers.clone()
    }

    pub fn policies(&self) -> Vec<String> {
        self.state.lock().unwrap().policies.clone()
    }

    pub fn stored(&self, name: &str) -> Option<K> {
        self.state.lock().unwrap().objects.get(name).cloned()
    }
}

impl<K> State<K> {
    fn record(&mut self, namespace: &str, call: Call) {
        self.routes.push((namespace.to_string(), call.clone()));
        self.calls.push(call);
    }

    fn take_failure(&mut self, op: &str) -> Option<u16> {
        self.failures.get_mut(op).and_then(VecDeque::pop_front)
    }
}

fn keep_server_fields(new: &mut ObjectMeta, old: &ObjectMeta) {
    new.uid = old.uid.clone();
    new.creation_timestamp = old.creation_timestamp.clone();
    new.resource_version = old.resource_version.clone();
}

#[async_trait]
impl<K: ManagedKind> KindClient<K> for Stub<K> {
    async fn get(&self, name: &str) -> kube::Result<K> {
        let mut st = self.state.lock().unwrap();
        st.record(&self.namespace, Call::Get(name.to_string()));
        if let Some(code) = st.take_failure("get") {
            return Err(api_err(code));
        }
        st.objects.get(name).cloned().ok_or_else(|| api_err(404))
    }

    async fn list(&self, params: &ListParams) -> kube::Result<Page<K>> {
        let mut st = self.state.lock().unwrap();
        st.record(&self.namespace, Call::List(params.continue_token.clone()));
        st.pages.pop_front().unwrap_or_else(|| Ok(Page { items: vec![], continue_token: None }))
    }

    async fn patch(&self, name: &str, params: &PatchParams, body: &Json) -> kube::Result<K> {
        let mut st = self.state.lock().unwrap();
        st.record(&self.namespace, Call::Patch(name.to_string()));
        st.managers.push(params.field_manager.clone());
        if let Some(code) = st.take_failure("patch") {
            return Err(api_err(code));
        }
        let Some(old) = st.objects.get(name).cloned() else {
            return Err(api_err(404));
        };
        let mut new: K = serde_json::from_value(body.clone()).map_err(kube::Error::SerdeError)?;
        keep_server_fields(new.meta_mut(), old.meta());
        if new != old {
            st.rv += 1;
            new.meta_mut().resource_version = Some(st.rv.to_string());
        }
        st.objects.insert(name.to_string(), new.clone());
        Ok(new)
    }

    async fn create(&self, params: &PostParams, obj: &K) -> kube::Result<K> {
        let mut st = self.state.lock().unwrap();
        let name = obj.name_any();
        st.record(&self.namespace, Call::Create(name.clone()));
        st.managers.push(params.field_manager.clone());
        if let Some(code) = st.take_failure("create") {
            return Err(api_err(code));
        }
        if st.objects.contains_key(&name) {
            return Err(api_err(409));
        }
        st.rv += 1;
        let mut new = obj.clone();
        let meta = new.meta_mut();
        meta.uid = Some(format!("uid-{}", st.rv));
        meta.resource_version = Some(st.rv.to_string());
        st.objects.insert(name, new.clone());
        Ok(new)
    }

    async fn replace(&self, name: &str, params: &PostParams, obj: &K) -> kube::Result<K> {
        let mut st = self.state.lock().unwrap();
        st.record(&self.namespace, Call::Replace(name.to_string()));
        st.managers.push(params.field_manager.clone());
        if let Some(code) = st.take_failure("replace") {
            return Err(api_err(code));
        }
        let Some(old) = st.objects.get(name).cloned() else {
            return Err(api_err(404));
        };
        st.rv += 1;
        let mut new = obj.clone();
        keep_server_fields(new.meta_mut(), old.meta());
        new.meta_mut().resource_version = Some(st.rv.to_string());
        st.objects.insert(name.to_string(), new.clone());
        Ok(new)
    }

    async fn delete(&self, name: &str, params: &DeleteParams) -> kube::Result<()> {
        let mut st = self.state.lock().unwrap();
        st.record(&self.namespace, Call::Delete(name.to_string()));
        st.policies.push(format!("{:?}", params.propagation_policy));
        if let Some(code) = st.take_failure("delete") {
            return Err(api_err(code));
        }
        st.objects.remove(name).map(|_| ()).ok_or_else(|| api_err(404))
    }

    fn in_namespace(&self, namespace: &str) -> Arc<dyn KindClient<K>> {
        Arc::new(Stub { state: self.state.clone(), namespace: namespace.to_string() })
    }
}

/// Records collection deletes of dependents.
#[derive(Default)]
pub struct DependentsStub {
    pub selectors: Mutex<Vec<String>>,
}

#[async_trait]
impl Dependents for DependentsStub {
    async fn delete_matching(&self, selector: &str, _params: &DeleteParams) -> kube::Result<()> {
        self.selectors.lock().unwrap().push(selector.to_string());
        Ok(())
    }
}

pub fn deleting_at(secs: i64) -> Time {
    use chrono::TimeZone;
    Time(chrono::Utc.timestamp_opt(secs, 0).single().unwrap())
}
