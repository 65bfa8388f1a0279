//! Request / accept / break: the two-phase association handshake.
//!
//! Each call performs only the caller's half:
//!
//! - a **parent** shares or unshares the target into its association group;
//! - a **child** adds or removes a reference tag on itself and persists.
//!
//! A relationship reads as `Associated` only once both halves have been
//! written, by two separate calls from the two sides. Nothing here is atomic
//! across sides and nothing is retried; failures from the external services
//! are wrapped with the ids involved and returned.

use tracing::{info, warn};

use crate::engine::Associations;
use crate::entity::{AssociationRef, Entity, EntityType};
use crate::error::AssociationError;
use crate::hierarchy::Perspective;
use crate::keyword;
use crate::services::ServiceContext;

impl Associations {
    /// Write the caller's half of an association with `association_type` `id`.
    ///
    /// Validates the pair before any I/O. `entity` is mutated in place when
    /// it is the child.
    pub async fn request_association(
        &self,
        entity: &mut Entity,
        association_type: EntityType,
        id: &str,
        ctx: &ServiceContext,
    ) -> Result<(), AssociationError> {
        match self.perspective(entity, association_type)? {
            Perspective::Parent => self.include(entity, association_type, id, ctx).await,
            Perspective::Child => self.claim(entity, association_type, id, ctx).await,
        }
    }

    /// Same mechanics as [`request_association`](Self::request_association);
    /// used when the counterpart's half is already present.
    pub async fn accept_association(
        &self,
        entity: &mut Entity,
        association_type: EntityType,
        id: &str,
        ctx: &ServiceContext,
    ) -> Result<(), AssociationError> {
        self.request_association(entity, association_type, id, ctx)
            .await
    }

    /// Remove the caller's half of an association.
    pub async fn break_association(
        &self,
        entity: &mut Entity,
        association_type: EntityType,
        id: &str,
        ctx: &ServiceContext,
    ) -> Result<(), AssociationError> {
        match self.perspective(entity, association_type)? {
            Perspective::Parent => self.exclude(entity, id, ctx).await,
            Perspective::Child => self.unclaim(entity, association_type, id, ctx).await,
        }
    }

    async fn include(
        &self,
        parent: &Entity,
        child_type: EntityType,
        child_id: &str,
        ctx: &ServiceContext,
    ) -> Result<(), AssociationError> {
        let group_id = association_group(parent)?;

        let child = ctx
            .entities
            .fetch(child_type, child_id)
            .await
            .map_err(|source| AssociationError::Fetch {
                entity_type: child_type,
                id: child_id.to_string(),
                source,
            })?;

        if let Err(source) = ctx.groups.add_member(child_id, group_id, &child.owner).await {
            warn!(
                entity_id = %parent.id,
                target_id = %child_id,
                group_id = %group_id,
                error = %source,
                "Sharing into association group failed"
            );
            return Err(AssociationError::Share {
                item_id: child_id.to_string(),
                group_id: group_id.to_string(),
                source,
            });
        }

        info!(
            entity_type = %parent.entity_type,
            entity_id = %parent.id,
            target_id = %child_id,
            group_id = %group_id,
            "Included target in association group"
        );
        Ok(())
    }

    async fn exclude(
        &self,
        parent: &Entity,
        child_id: &str,
        ctx: &ServiceContext,
    ) -> Result<(), AssociationError> {
        let group_id = association_group(parent)?;

        if let Err(source) = ctx.groups.remove_member(child_id, group_id).await {
            warn!(
                entity_id = %parent.id,
                target_id = %child_id,
                group_id = %group_id,
                error = %source,
                "Unsharing from association group failed"
            );
            return Err(AssociationError::Unshare {
                item_id: child_id.to_string(),
                group_id: group_id.to_string(),
                source,
            });
        }

        info!(
            entity_type = %parent.entity_type,
            entity_id = %parent.id,
            target_id = %child_id,
            group_id = %group_id,
            "Removed target from association group"
        );
        Ok(())
    }

    async fn claim(
        &self,
        child: &mut Entity,
        parent_type: EntityType,
        parent_id: &str,
        ctx: &ServiceContext,
    ) -> Result<(), AssociationError> {
        let target = AssociationRef::new(parent_type, parent_id);
        let changed = keyword::add_reference_checked(child, &target, &self.limits)?;
        persist(child, ctx).await?;

        info!(
            entity_type = %child.entity_type,
            entity_id = %child.id,
            target_id = %parent_id,
            changed,
            "Reference tag written"
        );
        Ok(())
    }

    async fn unclaim(
        &self,
        child: &mut Entity,
        parent_type: EntityType,
        parent_id: &str,
        ctx: &ServiceContext,
    ) -> Result<(), AssociationError> {
        child.tags = keyword::remove(&child.tags, parent_type, parent_id);
        persist(child, ctx).await?;

        info!(
            entity_type = %child.entity_type,
            entity_id = %child.id,
            target_id = %parent_id,
            "Reference tag removed"
        );
        Ok(())
    }
}

fn association_group(parent: &Entity) -> Result<&str, AssociationError> {
    parent
        .association
        .as_ref()
        .map(|config| config.group_id.as_str())
        .ok_or_else(|| AssociationError::NotProvisioned {
            entity_type: parent.entity_type,
            id: parent.id.clone(),
        })
}

async fn persist(entity: &Entity, ctx: &ServiceContext) -> Result<(), AssociationError> {
    ctx.entities
        .persist(entity.entity_type, entity)
        .await
        .map_err(|source| {
            warn!(
                entity_type = %entity.entity_type,
                entity_id = %entity.id,
                error = %source,
                "Persisting entity failed"
            );
            AssociationError::Persist {
                entity_type: entity.entity_type,
                id: entity.id.clone(),
                source,
            }
        })
}
