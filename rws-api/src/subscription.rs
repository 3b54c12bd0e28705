//! Subscription sets: the resources a session asks the controller to push
//!
//! A [`SubscriptionSet`] is built by the caller before a session is opened and
//! is encoded into the form body of the subscription request. Insertion order
//! is preserved so request bodies are deterministic.

use serde::{Deserialize, Serialize};

use crate::resource::ResourceDescriptor;

/// How urgently the controller should deliver events for a resource
///
/// `High` is only honoured for IO signals and persistent RAPID variables on
/// recent controller firmware. This is not checked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubscriptionPriority {
    Low,
    Medium,
    High,
}

impl SubscriptionPriority {
    /// Integer the controller expects in the `<n>-p` form field
    pub fn as_code(&self) -> u8 {
        match self {
            SubscriptionPriority::Low => 0,
            SubscriptionPriority::Medium => 1,
            SubscriptionPriority::High => 2,
        }
    }
}

/// One subscribed resource URI and its priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionResource {
    resource_uri: String,
    priority: SubscriptionPriority,
}

impl SubscriptionResource {
    pub fn new(resource_uri: impl Into<String>, priority: SubscriptionPriority) -> Self {
        Self {
            resource_uri: resource_uri.into(),
            priority,
        }
    }

    pub fn resource_uri(&self) -> &str {
        &self.resource_uri
    }

    pub fn priority(&self) -> SubscriptionPriority {
        self.priority
    }
}

/// Ordered collection of resources to subscribe to
///
/// Duplicate URIs are kept as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSet {
    resources: Vec<SubscriptionResource>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw resource URI
    pub fn add(&mut self, resource_uri: impl Into<String>, priority: SubscriptionPriority) -> &mut Self {
        self.resources
            .push(SubscriptionResource::new(resource_uri, priority));
        self
    }

    pub fn add_resource(&mut self, descriptor: &ResourceDescriptor, priority: SubscriptionPriority) -> &mut Self {
        self.add(descriptor.uri(), priority)
    }

    pub fn add_io_signal(&mut self, name: &str, priority: SubscriptionPriority) -> &mut Self {
        self.add_resource(&ResourceDescriptor::io_signal(name), priority)
    }

    pub fn add_rapid_persistent_variable(
        &mut self,
        task: &str,
        module: &str,
        name: &str,
        priority: SubscriptionPriority,
    ) -> &mut Self {
        self.add_resource(
            &ResourceDescriptor::rapid_persistent_variable(task, module, name),
            priority,
        )
    }

    pub fn add_elog_domain(&mut self, domain: u32, priority: SubscriptionPriority) -> &mut Self {
        self.add_resource(&ResourceDescriptor::elog_domain(domain), priority)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SubscriptionResource> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Form body for the subscription POST and PUT requests
    ///
    /// Each resource `i` contributes `resources=i&i=<uri>&i-p=<priority>`.
    pub fn encode_body(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (index, resource) in self.resources.iter().enumerate() {
            let key = index.to_string();
            serializer.append_pair("resources", &key);
            serializer.append_pair(&key, &resource.resource_uri);
            serializer.append_pair(&format!("{}-p", key), &resource.priority.as_code().to_string());
        }
        serializer.finish()
    }
}

impl<'a> IntoIterator for &'a SubscriptionSet {
    type Item = &'a SubscriptionResource;
    type IntoIter = std::slice::Iter<'a, SubscriptionResource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}

impl FromIterator<SubscriptionResource> for SubscriptionSet {
    fn from_iter<I: IntoIterator<Item = SubscriptionResource>>(iter: I) -> Self {
        Self {
            resources: iter.into_iter().collect(),
        }
    }
}
