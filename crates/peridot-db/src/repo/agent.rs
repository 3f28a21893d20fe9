//! Agent repository.

use async_trait::async_trait;
use peridot_core::{Agent, AgentAbilities, AgentId};
use sqlx::PgPool;

use super::expect_affected;
use crate::error::{pg_key, row_key};
use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
struct AgentRow {
    id: i32,
    name: String,
    is_active: bool,
    address: String,
    port: i32,
    is_codereader: bool,
    is_spdxreader: bool,
    is_codewriter: bool,
    is_spdxwriter: bool,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DbError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port)
            .map_err(|_| DbError::InvalidInput(format!("agent port {} out of range", row.port)))?;
        Ok(Agent {
            id: AgentId::new(row_key(row.id)?),
            name: row.name,
            is_active: row.is_active,
            address: row.address,
            port,
            abilities: AgentAbilities {
                code_reader: row.is_codereader,
                spdx_reader: row.is_spdxreader,
                code_writer: row.is_codewriter,
                spdx_writer: row.is_spdxwriter,
            },
        })
    }
}

#[async_trait]
pub trait AgentRepo: Send + Sync {
    async fn get_all(&self) -> DbResult<Vec<Agent>>;
    async fn get_by_id(&self, id: AgentId) -> DbResult<Agent>;
    async fn get_by_name(&self, name: &str) -> DbResult<Agent>;
    async fn add(
        &self,
        name: &str,
        is_active: bool,
        address: &str,
        port: u16,
        abilities: AgentAbilities,
    ) -> DbResult<AgentId>;
    /// Record whether the agent is up and where to reach it.
    async fn update_status(
        &self,
        id: AgentId,
        is_active: bool,
        address: &str,
        port: u16,
    ) -> DbResult<()>;
    async fn update_abilities(&self, id: AgentId, abilities: AgentAbilities) -> DbResult<()>;
    async fn delete(&self, id: AgentId) -> DbResult<()>;
}

/// PostgreSQL implementation of AgentRepo.
pub struct PgAgentRepo {
    pool: PgPool,
}

impl PgAgentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const AGENT_COLUMNS: &str =
    "id, name, is_active, address, port, is_codereader, is_spdxreader, is_codewriter, is_spdxwriter";

#[async_trait]
impl AgentRepo for PgAgentRepo {
    async fn get_all(&self) -> DbResult<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {AGENT_COLUMNS} FROM peridot.agents ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn get_by_id(&self, id: AgentId) -> DbResult<Agent> {
        sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {AGENT_COLUMNS} FROM peridot.agents WHERE id = $1"
        ))
        .bind(pg_key(id.get())?)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("agent", id))?
        .try_into()
    }

    async fn get_by_name(&self, name: &str) -> DbResult<Agent> {
        sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {AGENT_COLUMNS} FROM peridot.agents WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound {
            entity: "agent",
            id: format!("name {name}"),
        })?
        .try_into()
    }

    async fn add(
        &self,
        name: &str,
        is_active: bool,
        address: &str,
        port: u16,
        abilities: AgentAbilities,
    ) -> DbResult<AgentId> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO peridot.agents
                (name, is_active, address, port, is_codereader, is_spdxreader, is_codewriter, is_spdxwriter)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(is_active)
        .bind(address)
        .bind(i32::from(port))
        .bind(abilities.code_reader)
        .bind(abilities.spdx_reader)
        .bind(abilities.code_writer)
        .bind(abilities.spdx_writer)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from_constraint(e, format!("agent {name:?}")))?;
        Ok(AgentId::new(row_key(id)?))
    }

    async fn update_status(
        &self,
        id: AgentId,
        is_active: bool,
        address: &str,
        port: u16,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE peridot.agents SET is_active = $1, address = $2, port = $3 WHERE id = $4",
        )
        .bind(is_active)
        .bind(address)
        .bind(i32::from(port))
        .bind(pg_key(id.get())?)
        .execute(&self.pool)
        .await?;
        expect_affected(result, "agent", id)
    }

    async fn update_abilities(&self, id: AgentId, abilities: AgentAbilities) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE peridot.agents
            SET is_codereader = $1, is_spdxreader = $2, is_codewriter = $3, is_spdxwriter = $4
            WHERE id = $5
            "#,
        )
        .bind(abilities.code_reader)
        .bind(abilities.spdx_reader)
        .bind(abilities.code_writer)
        .bind(abilities.spdx_writer)
        .bind(pg_key(id.get())?)
        .execute(&self.pool)
        .await?;
        expect_affected(result, "agent", id)
    }

    async fn delete(&self, id: AgentId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM peridot.agents WHERE id = $1")
            .bind(pg_key(id.get())?)
            .execute(&self.pool)
            .await?;
        expect_affected(result, "agent", id)
    }
}
