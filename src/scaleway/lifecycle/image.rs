//! Image resolution for the Scaleway provider.
//!
//! The configured image may already be an image UUID, in which case it is
//! used as is. Anything else is treated as a label and resolved to the newest
//! available image for the configured architecture, preferring images owned
//! by the project over public ones.

use std::future::Future;

use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::config::ScalewayConfig;

use super::super::{ScalewayProvider, ScalewayProviderError};

/// Lookup parameters for resolving an image label.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct ImageQuery {
    pub(crate) label: String,
    pub(crate) architecture: String,
    pub(crate) zone: String,
    pub(crate) project_id: String,
    pub(crate) organisation_id: Option<String>,
}

impl ImageQuery {
    pub(crate) fn new(label: &str, config: &ScalewayConfig) -> Self {
        Self {
            label: label.to_owned(),
            architecture: config.default_architecture.clone(),
            zone: config.default_zone.clone(),
            project_id: config.default_project_id.clone(),
            organisation_id: config.default_organization_id.clone(),
        }
    }

    pub(crate) fn is_image_id(&self) -> bool {
        Uuid::parse_str(self.label.trim()).is_ok()
    }
}

impl ScalewayProvider {
    #[expect(
        clippy::excessive_nesting,
        reason = "organisation scoping requires nested builder updates before execution"
    )]
    pub(in crate::scaleway) async fn resolve_image_id(
        &self,
        query: &ImageQuery,
    ) -> Result<String, ScalewayProviderError> {
        if query.is_image_id() {
            return Ok(query.label.trim().to_owned());
        }

        self.resolve_image_id_with(
            query,
            || async move {
                if query.project_id.is_empty() {
                    Ok(Vec::new())
                } else {
                    let mut scoped =
                        ScalewayListInstanceImagesBuilder::new(self.api.clone(), &query.zone)
                            .public(true)
                            .project(&query.project_id)
                            .name(&query.label)
                            .arch(&query.architecture);
                    if let Some(org) = &query.organisation_id {
                        scoped = scoped.organization(org);
                    }
                    scoped.run_async().await.map_err(ScalewayProviderError::from)
                }
            },
            || async move {
                ScalewayListInstanceImagesBuilder::new(self.api.clone(), &query.zone)
                    .public(true)
                    .name(&query.label)
                    .arch(&query.architecture)
                    .run_async()
                    .await
                    .map_err(ScalewayProviderError::from)
            },
        )
        .await
    }

    pub(in crate::scaleway) async fn resolve_image_id_with<FutA, FutB, FetchA, FetchB>(
        &self,
        query: &ImageQuery,
        project_fetch: FetchA,
        public_fetch: FetchB,
    ) -> Result<String, ScalewayProviderError>
    where
        FetchA: FnOnce() -> FutA,
        FetchB: FnOnce() -> FutB,
        FutA: Future<Output = Result<Vec<ScalewayImage>, ScalewayProviderError>>,
        FutB: Future<Output = Result<Vec<ScalewayImage>, ScalewayProviderError>>,
    {
        let project_images = project_fetch().await?;

        let public_images = if project_images.is_empty() {
            debug!(label = %query.label, "no project image; falling back to public images");
            public_fetch().await?
        } else {
            Vec::new()
        };

        Self::select_image_from_sources(project_images, public_images, query)
    }

    pub(in crate::scaleway) fn select_image_id(
        mut candidates: Vec<ScalewayImage>,
        query: &ImageQuery,
    ) -> Result<String, ScalewayProviderError> {
        if candidates.is_empty() {
            return Err(ScalewayProviderError::ImageNotFound {
                label: query.label.clone(),
                arch: query.architecture.clone(),
                zone: query.zone.clone(),
            });
        }
        candidates.sort_by(|lhs, rhs| rhs.creation_date.cmp(&lhs.creation_date));
        Ok(candidates.remove(0).id)
    }

    pub(in crate::scaleway) fn select_image_from_sources(
        project_images: Vec<ScalewayImage>,
        public_images: Vec<ScalewayImage>,
        query: &ImageQuery,
    ) -> Result<String, ScalewayProviderError> {
        let primary = if project_images.is_empty() {
            public_images
        } else {
            project_images
        };

        Self::select_image_id(Self::filter_images(primary, query), query)
    }

    pub(in crate::scaleway) fn filter_images(
        images: Vec<ScalewayImage>,
        query: &ImageQuery,
    ) -> Vec<ScalewayImage> {
        images
            .into_iter()
            .filter(|image| image.arch == query.architecture)
            .filter(|image| image.state == "available")
            .collect()
    }
}
