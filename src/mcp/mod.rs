//! MCP server exposing spec documents to AI agents.

mod types;

use std::str::FromStr;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;

use crate::document;
use crate::editor::{self, SECTION_DEPTH};
use crate::error::Error;
use crate::graph::{self, EdgePolicy, SortOrder};
use crate::history::{BackfillOptions, Backfiller, GitCli};
use crate::models::*;
use crate::store::{MetadataUpdate, RawSpec, SpecStore};

#[derive(Clone)]
pub struct McpServer {
    store: SpecStore,
    tool_router: ToolRouter<Self>,
}

/// Caller mistakes become `invalid_params` so the agent can correct them;
/// I/O and git failures are internal errors.
fn to_mcp_error(e: Error) -> McpError {
    match e {
        Error::NotFound(_)
        | Error::SectionNotFound { .. }
        | Error::ItemNotFound { .. }
        | Error::Conflict { .. }
        | Error::InvalidPath(_)
        | Error::Schema { .. }
        | Error::InvalidDependency { .. } => McpError::invalid_params(e.to_string(), None),
        _ => McpError::internal_error(e.to_string(), None),
    }
}

fn parse_param<T: FromStr<Err = String>>(value: Option<&str>) -> Result<Option<T>, McpError> {
    value
        .map(|v| T::from_str(v).map_err(|e| McpError::invalid_params(e, None)))
        .transpose()
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

impl McpServer {
    pub fn new(store: SpecStore) -> Self {
        Self {
            store,
            tool_router: Self::tool_router(),
        }
    }

    // ============================================================
    // Tool logic, shared by the tool handlers and tests
    // ============================================================

    pub fn list_specs_response(
        &self,
        req: ListSpecsRequest,
    ) -> Result<SpecListResponse, McpError> {
        let status: Option<SpecStatus> = parse_param(req.status.as_deref())?;
        let priority: Option<SpecPriority> = parse_param(req.priority.as_deref())?;

        let specs = self
            .store
            .summaries()
            .map_err(to_mcp_error)?
            .into_iter()
            .filter(|s| status.is_none() || s.status == status)
            .filter(|s| priority.is_none() || s.priority == priority)
            .collect();
        Ok(SpecListResponse { specs })
    }

    pub fn view_spec_response(&self, req: ViewSpecRequest) -> Result<SpecViewResponse, McpError> {
        let raw = match req.file.as_deref() {
            Some(file) => self.store.get_sub_raw(&req.spec, file),
            None => self.store.get_raw(&req.spec),
        }
        .map_err(to_mcp_error)?;
        Ok(Self::view(raw))
    }

    fn view(raw: RawSpec) -> SpecViewResponse {
        let body = document::split(&raw.content)
            .map(|(_, body)| body)
            .unwrap_or(raw.content.as_str());
        let sections = editor::sections(body)
            .into_iter()
            .filter(|s| s.heading.depth == SECTION_DEPTH)
            .map(|s| s.heading.title)
            .collect();
        let items = editor::checklist_items(body);
        let checklist = ChecklistProgress {
            done: items.iter().filter(|i| i.checked).count(),
            total: items.len(),
        };

        SpecViewResponse {
            id: raw.id,
            path: raw.path,
            content: raw.content,
            content_hash: raw.content_hash,
            sections,
            checklist,
        }
    }

    pub fn update_spec_response(&self, req: UpdateSpecRequest) -> Result<WriteResponse, McpError> {
        let expected = req.expected_content_hash.as_deref();
        let content_hash = match req.file.as_deref() {
            Some(file) => self.store.update_sub_raw(&req.spec, file, &req.content, expected),
            None => self.store.update_raw(&req.spec, &req.content, expected),
        }
        .map_err(to_mcp_error)?;
        Ok(WriteResponse {
            id: req.spec,
            content_hash,
        })
    }

    pub fn update_section_response(
        &self,
        req: UpdateSectionRequest,
    ) -> Result<WriteResponse, McpError> {
        let expected = req.expected_content_hash.as_deref();
        let content_hash = match req.mode {
            SectionMode::Replace => {
                self.store
                    .update_section(&req.spec, &req.section, &req.content, expected)
            }
            SectionMode::Append => {
                self.store
                    .append_section(&req.spec, &req.section, &req.content, expected)
            }
        }
        .map_err(to_mcp_error)?;
        Ok(WriteResponse {
            id: req.spec,
            content_hash,
        })
    }

    pub fn toggle_checklist_response(
        &self,
        req: ToggleChecklistRequest,
    ) -> Result<WriteResponse, McpError> {
        let content_hash = self
            .store
            .toggle_checklist(
                &req.spec,
                &req.item,
                req.checked,
                req.expected_content_hash.as_deref(),
            )
            .map_err(to_mcp_error)?;
        Ok(WriteResponse {
            id: req.spec,
            content_hash,
        })
    }

    pub fn update_metadata_response(
        &self,
        req: UpdateMetadataRequest,
    ) -> Result<WriteResponse, McpError> {
        let update = MetadataUpdate {
            status: parse_param(req.status.as_deref())?,
            priority: parse_param(req.priority.as_deref())?,
            tags: req.tags,
            assignee: req.assignee,
        };
        let content_hash = self
            .store
            .update_metadata(&req.spec, update, req.expected_content_hash.as_deref())
            .map_err(to_mcp_error)?;
        Ok(WriteResponse {
            id: req.spec,
            content_hash,
        })
    }

    pub fn spec_tree_response(&self, req: SpecTreeRequest) -> Result<SpecTreeResponse, McpError> {
        let order: SortOrder = parse_param(req.sort.as_deref())?.unwrap_or_default();
        let summaries = self.store.summaries().map_err(to_mcp_error)?;
        let roots = graph::build_hierarchy(&summaries, order);
        Ok(SpecTreeResponse {
            tree: graph::render_tree(&roots),
            roots,
        })
    }

    pub fn spec_dependencies_response(
        &self,
        req: SpecDependenciesRequest,
    ) -> Result<DependenciesResponse, McpError> {
        let policy: EdgePolicy = parse_param(req.policy.as_deref())?.unwrap_or_default();
        let summaries = self.store.summaries().map_err(to_mcp_error)?;
        let deps = graph::build_dependency_graph(&summaries, policy).map_err(to_mcp_error)?;

        let Some(spec) = req.spec else {
            return Ok(DependenciesResponse::Graph(deps));
        };
        let id = self.store.resolve(&spec).map_err(to_mcp_error)?.id;
        let owned =
            |ids: Vec<&str>| -> Vec<String> { ids.into_iter().map(str::to_string).collect() };
        Ok(DependenciesResponse::Spec(SpecRelationsResponse {
            depends_on: owned(deps.depends_on(&id)),
            required_by: owned(deps.required_by(&id)),
            id,
        }))
    }

    pub fn backfill_history_response(
        &self,
        req: BackfillHistoryRequest,
    ) -> Result<BackfillResponse, McpError> {
        let options = BackfillOptions {
            assignee: req.assignee,
            transitions: req.transitions,
            force: req.force,
            bootstrap: req.bootstrap,
            dry_run: req.dry_run,
        };
        let backfiller = Backfiller::new(&self.store, GitCli::default(), options);
        let report = if req.specs.is_empty() {
            backfiller.run_all().map_err(to_mcp_error)?
        } else {
            backfiller.run(&req.specs)
        };

        Ok(BackfillResponse::from_report(report, req.dry_run))
    }
}

#[tool_router]
impl McpServer {
    // ============================================================
    // Reading
    // ============================================================

    #[tool(
        description = "List specs with their id, title, status, priority, parent and dependencies. Optionally filter by status or priority. Use this to find the spec you need before viewing or editing it."
    )]
    async fn list_specs(
        &self,
        params: Parameters<ListSpecsRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.list_specs_response(params.0)?)
    }

    #[tool(
        description = "Read a spec's full content with its contentHash, section titles and checklist progress. Pass 'file' to read another document in the spec directory. Keep the contentHash: pass it back as expectedContentHash when editing so concurrent changes are detected."
    )]
    async fn view_spec(
        &self,
        params: Parameters<ViewSpecRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.view_spec_response(params.0)?)
    }

    #[tool(
        description = "Show the spec hierarchy built from 'parent' fields as an ASCII tree plus structured nodes. Specs whose parent is missing appear as roots."
    )]
    async fn spec_tree(
        &self,
        params: Parameters<SpecTreeRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.spec_tree_response(params.0)?)
    }

    #[tool(
        description = "Show 'depends on' relations. Without 'spec', returns every node and edge. With 'spec', returns that spec's direct dependencies and the specs that require it."
    )]
    async fn spec_dependencies(
        &self,
        params: Parameters<SpecDependenciesRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.spec_dependencies_response(params.0)?)
    }

    // ============================================================
    // Editing
    // ============================================================

    #[tool(
        description = "Overwrite a spec document with new content. Prefer update_section or toggle_checklist for targeted edits. Returns the new contentHash. Fails without writing if expectedContentHash no longer matches the file."
    )]
    async fn update_spec(
        &self,
        params: Parameters<UpdateSpecRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.update_spec_response(params.0)?)
    }

    #[tool(
        description = "Replace or append to the content of a '## ' section, leaving the rest of the document byte-for-byte unchanged. Fails if the section does not exist. Returns the new contentHash."
    )]
    async fn update_section(
        &self,
        params: Parameters<UpdateSectionRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.update_section_response(params.0)?)
    }

    #[tool(
        description = "Check or uncheck a '- [ ]' checklist item by its text. Only the first matching item changes, so use enough text to be unique. Returns the new contentHash."
    )]
    async fn toggle_checklist(
        &self,
        params: Parameters<ToggleChecklistRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.toggle_checklist_response(params.0)?)
    }

    #[tool(
        description = "Update status, priority, tags or assignee in a spec's header. A status change records a transition with a timestamp; moving to 'complete' also records completion time. Returns the new contentHash."
    )]
    async fn update_spec_metadata(
        &self,
        params: Parameters<UpdateMetadataRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.update_metadata_response(params.0)?)
    }

    #[tool(
        description = "Fill missing created/updated/completed timestamps (and optionally assignee and status transitions) from git history. Existing values are kept unless force is set. Use dryRun to preview. Each spec succeeds or fails on its own."
    )]
    async fn backfill_history(
        &self,
        params: Parameters<BackfillHistoryRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.backfill_history_response(params.0)?)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "spec-manifest".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"Spec Manifest manages versioned spec documents: one directory per spec
(e.g. specs/007-auth-flow/README.md) holding a YAML header and markdown body.

HEADER FIELDS:
- status: planned → in-progress → complete, or archived
- created: date the spec was written (YYYY-MM-DD)
- priority: low, medium, high or critical
- tags, assignee, parent (spec id), depends_on (list of spec ids)
- created_at, updated_at, completed_at, transitions: maintained by the tools

REFERRING TO SPECS:
Use the directory name ("007-auth-flow"), the number ("7" or "007"), or the
name part ("auth-flow").

EDITING WORKFLOW:
1. Call view_spec and keep the returned contentHash
2. Edit with update_section, toggle_checklist or update_spec_metadata,
   passing expectedContentHash
3. On a conflict error, call view_spec again and redo the edit on the new
   content; never retry blindly
Every edit returns the new contentHash for the next edit.

NAVIGATION:
- list_specs: find specs by status or priority
- spec_tree: parent/child hierarchy
- spec_dependencies: what a spec depends on and what depends on it

HISTORY:
backfill_history fills missing timestamps from git. Run with dryRun first.
Set bootstrap to create headers for older specs that have none."#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(store: SpecStore) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!(
        "Starting MCP server via stdio for {}",
        store.config().specs_dir.display()
    );

    let service = McpServer::new(store);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
