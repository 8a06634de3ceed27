//! Ledger store
//!
//! Validated reads and writes of groups, expenses and settlements over the
//! [`DocumentStore`] port.
//!
//! # Write path
//!
//! 1. Validate the draft or merged record (`ValidationError`, never stored)
//! 2. Return the stored record if the draft's `operation_id` already landed
//! 3. Resolve the group, check membership and freeze an FX rate if the
//!    record's currency differs from the group's
//! 4. Write the record, then append an activity entry
//!
//! Activity entries are best effort: a failure to append one is logged and
//! does not fail the write it describes.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use chrono::NaiveDate;
use core_kernel::{
    Clock, Currency, Document, DocumentStore, ExpenseId, GroupId, OperationId, PortError,
    Predicate, SettlementId, UserId,
};
use domain_fx::RateLookup;

use crate::activity::{Activity, NewActivity};
use crate::error::{LedgerError, ValidationError};
use crate::expense::{Expense, ExpenseDraft, ExpensePatch, ExpenseRevision, FxSnapshot};
use crate::group::{Group, GroupDraft};
use crate::kinds::ActivityKind;
use crate::recurrence::occurrence_key;
use crate::records::{
    decode, doc_id, encode, parse_id, ActivityRecord, ExpenseRecord, GroupRecord,
    SettlementRecord, ACTIVITIES, EXPENSES, GROUPS, SETTLEMENTS,
};
use crate::settlement::{Settlement, SettlementDraft};
use crate::validation::ensure_members;

/// Validated CRUD over the ledger's records
pub struct LedgerStore {
    documents: Arc<dyn DocumentStore>,
    rates: Arc<dyn RateLookup>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore").finish_non_exhaustive()
    }
}

impl LedgerStore {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        rates: Arc<dyn RateLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            documents,
            rates,
            clock,
        }
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Creates a group
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_group(&self, draft: GroupDraft) -> Result<Group, LedgerError> {
        draft.validate()?;

        let record = GroupRecord {
            name: draft.name,
            members: draft.members,
            currency: draft.currency,
            created_by: draft.created_by,
            created_at: self.clock.now(),
        };
        let id = self.documents.create(GROUPS, encode(&record)?).await?;
        let group = record.into_group(parse_id(&id)?);

        info!(group_id = %group.id, "group created");
        self.record_activity(NewActivity::for_group(
            ActivityKind::GroupCreated,
            &group.created_by,
            &group,
        ))
        .await;
        Ok(group)
    }

    pub async fn get_group(&self, id: GroupId) -> Result<Group, LedgerError> {
        let doc = self
            .documents
            .get(GROUPS, &doc_id(id.as_uuid()))
            .await?
            .ok_or_else(|| LedgerError::not_found("Group", id))?;
        Ok(group_from(doc)?)
    }

    /// Deletes a group; its expenses and settlements are left in place
    #[instrument(skip(self))]
    pub async fn delete_group(&self, id: GroupId, actor: &UserId) -> Result<(), LedgerError> {
        let group = self.get_group(id).await?;
        self.documents.delete(GROUPS, &doc_id(id.as_uuid())).await?;

        info!(group_id = %id, "group deleted");
        self.record_activity(NewActivity::for_group(ActivityKind::GroupDeleted, actor, &group))
            .await;
        Ok(())
    }

    /// Groups `user` belongs to
    pub async fn list_user_groups(&self, user: &UserId) -> Result<Vec<Group>, LedgerError> {
        let docs = self
            .documents
            .query(GROUPS, Predicate::contains("members", user))
            .await?;
        Ok(docs.into_iter().map(group_from).collect::<Result<_, _>>()?)
    }

    // ------------------------------------------------------------------
    // Expenses
    // ------------------------------------------------------------------

    /// Validates and stores a new expense
    ///
    /// # Errors
    ///
    /// - `Validation` if the draft breaks an amount or line invariant
    /// - `NotFound` if the referenced group does not exist
    /// - `FxUnavailable` if a conversion rate is needed and cannot be obtained
    /// - `Transport` if the document store fails
    #[instrument(skip(self, draft), fields(amount = %draft.amount, operation_id = tracing::field::Empty))]
    pub async fn create_expense(&self, draft: ExpenseDraft) -> Result<Expense, LedgerError> {
        draft.validate()?;

        if let Some(operation_id) = draft.operation_id {
            tracing::Span::current().record("operation_id", tracing::field::display(operation_id));
            if let Some(existing) = self.find_expense_by_operation(operation_id).await? {
                debug!(expense_id = %existing.id, "create already applied, returning stored expense");
                let entry = NewActivity::for_expense(
                    ActivityKind::ExpenseCreated,
                    &existing.created_by,
                    &existing,
                );
                self.record_activity(entry.with_operation_id(Some(operation_id))).await;
                return Ok(existing);
            }
        }

        let group = self.group_context(draft.group_id, &draft.participants()).await?;
        let fx = self
            .snapshot_rate(group.as_ref(), draft.amount.currency(), None)
            .await?;

        let now = self.clock.now();
        let record = ExpenseRecord {
            participants: draft.participants(),
            group_id: draft.group_id,
            description: draft.description,
            amount: draft.amount,
            category: draft.category,
            paid_by: draft.paid_by,
            split_between: draft.split_between,
            split_method: draft.split_method,
            date: draft.date,
            created_by: draft.created_by,
            recurrence: draft.recurrence,
            fx,
            occurrence_of: None,
            operation_id: draft.operation_id,
            created_at: now,
            updated_at: now,
        };
        let id = self.documents.create(EXPENSES, encode(&record)?).await?;
        let expense = record.into_expense(parse_id(&id)?);

        info!(expense_id = %expense.id, "expense created");
        self.record_activity(
            NewActivity::for_expense(ActivityKind::ExpenseCreated, &expense.created_by, &expense)
                .with_operation_id(expense.operation_id),
        )
        .await;
        Ok(expense)
    }

    /// Replaces an expense with `patch` merged over the stored record
    ///
    /// The stored FX snapshot is kept unless the currency or the group changes.
    pub async fn update_expense(
        &self,
        id: ExpenseId,
        patch: ExpensePatch,
    ) -> Result<Expense, LedgerError> {
        Ok(self.revise_expense(id, patch).await?.after)
    }

    /// Same as [`LedgerStore::update_expense`], also returning the record it replaced
    #[instrument(skip(self, patch))]
    pub async fn revise_expense(
        &self,
        id: ExpenseId,
        patch: ExpensePatch,
    ) -> Result<ExpenseRevision, LedgerError> {
        let stored = self.get_expense(id).await?;
        let mut merged = patch.merge_into(&stored)?;
        merged.validate()?;

        let group = self.group_context(merged.group_id, &merged.participants()).await?;
        let unchanged = merged.amount.currency() == stored.amount.currency()
            && merged.group_id == stored.group_id;
        let reuse = if unchanged { stored.fx } else { None };
        merged.fx = self
            .snapshot_rate(group.as_ref(), merged.amount.currency(), reuse)
            .await?;
        merged.updated_at = self.clock.now();

        self.documents
            .update(EXPENSES, &doc_id(id.as_uuid()), encode(&ExpenseRecord::from(&merged))?)
            .await?;

        info!(expense_id = %id, "expense updated");
        self.record_activity(
            NewActivity::for_expense(ActivityKind::ExpenseUpdated, &merged.created_by, &merged)
                .with_operation_id(patch.operation_id),
        )
        .await;
        Ok(ExpenseRevision {
            before: stored,
            after: merged,
        })
    }

    /// Deletes an expense, returning the removed record
    #[instrument(skip(self))]
    pub async fn delete_expense(&self, id: ExpenseId) -> Result<Expense, LedgerError> {
        let stored = self.get_expense(id).await?;
        self.documents.delete(EXPENSES, &doc_id(id.as_uuid())).await?;

        info!(expense_id = %id, "expense deleted");
        self.record_activity(NewActivity::for_expense(
            ActivityKind::ExpenseDeleted,
            &stored.created_by,
            &stored,
        ))
        .await;
        Ok(stored)
    }

    pub async fn get_expense(&self, id: ExpenseId) -> Result<Expense, LedgerError> {
        let doc = self
            .documents
            .get(EXPENSES, &doc_id(id.as_uuid()))
            .await?
            .ok_or_else(|| LedgerError::not_found("Expense", id))?;
        Ok(expense_from(doc)?)
    }

    pub async fn list_group_expenses(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<Expense>, LedgerError> {
        self.query_expenses(Predicate::eq("group_id", group_id)).await
    }

    /// Every expense `user` paid for or shares in, grouped or not
    pub async fn list_user_expenses(&self, user: &UserId) -> Result<Vec<Expense>, LedgerError> {
        self.query_expenses(Predicate::contains("participants", user)).await
    }

    // ------------------------------------------------------------------
    // Settlements
    // ------------------------------------------------------------------

    /// Validates and stores a settlement
    #[instrument(skip(self, draft), fields(amount = %draft.amount, from = %draft.from, to = %draft.to))]
    pub async fn create_settlement(
        &self,
        draft: SettlementDraft,
    ) -> Result<Settlement, LedgerError> {
        draft.validate()?;

        if let Some(operation_id) = draft.operation_id {
            if let Some(existing) = self.find_settlement_by_operation(operation_id).await? {
                debug!(settlement_id = %existing.id, "settlement already applied, returning stored record");
                self.record_activity(NewActivity::for_settlement(&existing)).await;
                return Ok(existing);
            }
        }

        let parties = [draft.from.clone(), draft.to.clone()];
        let group = self.group_context(draft.group_id, &parties).await?;
        let fx = self
            .snapshot_rate(group.as_ref(), draft.amount.currency(), None)
            .await?;

        let record = SettlementRecord {
            participants: parties.to_vec(),
            group_id: draft.group_id,
            from: draft.from,
            to: draft.to,
            amount: draft.amount,
            date: draft.date,
            notes: draft.notes,
            created_by: draft.created_by,
            fx,
            operation_id: draft.operation_id,
            created_at: self.clock.now(),
        };
        let id = self.documents.create(SETTLEMENTS, encode(&record)?).await?;
        let settlement = record.into_settlement(parse_id(&id)?);

        info!(settlement_id = %settlement.id, "settlement recorded");
        self.record_activity(NewActivity::for_settlement(&settlement)).await;
        Ok(settlement)
    }

    pub async fn get_settlement(&self, id: SettlementId) -> Result<Settlement, LedgerError> {
        let doc = self
            .documents
            .get(SETTLEMENTS, &doc_id(id.as_uuid()))
            .await?
            .ok_or_else(|| LedgerError::not_found("Settlement", id))?;
        Ok(settlement_from(doc)?)
    }

    pub async fn list_group_settlements(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<Settlement>, LedgerError> {
        self.query_settlements(Predicate::eq("group_id", group_id)).await
    }

    pub async fn list_user_settlements(
        &self,
        user: &UserId,
    ) -> Result<Vec<Settlement>, LedgerError> {
        self.query_settlements(Predicate::contains("participants", user)).await
    }

    // ------------------------------------------------------------------
    // Recurring expenses
    // ------------------------------------------------------------------

    /// Materialises every occurrence of `user`'s recurring expenses due on or before `as_of`
    ///
    /// Each occurrence is keyed `"{template id}#{period index}"` and looked up
    /// before it is written, so calling this again, or after a crash between
    /// writing an occurrence and advancing its template, creates nothing twice.
    /// Templates whose group has been deleted are skipped.
    #[instrument(skip(self))]
    pub async fn generate_due_recurring(
        &self,
        user: &UserId,
        as_of: NaiveDate,
    ) -> Result<Vec<Expense>, LedgerError> {
        let templates = self
            .query_expenses(Predicate::eq("created_by", user).and(Predicate::exists("recurrence")))
            .await?;

        let mut generated = Vec::new();
        for template in templates {
            let Some(schedule) = template.recurrence else {
                continue;
            };
            let due = schedule
                .due(as_of)
                .map_err(|err| ValidationError::InvalidRecurrence(err.to_string()))?;
            let Some(&(last_index, _)) = due.last() else {
                continue;
            };

            let group = match self
                .group_context(template.group_id, &template.participants())
                .await
            {
                Ok(group) => group,
                Err(err) if !err.is_retryable() => {
                    warn!(expense_id = %template.id, error = %err, "skipping recurring expense");
                    continue;
                }
                Err(err) => return Err(err),
            };

            for (index, date) in due {
                let key = occurrence_key(template.id, index);
                if self.find_occurrence(&key).await?.is_some() {
                    debug!(occurrence = %key, "occurrence already materialised");
                    continue;
                }
                let expense = self
                    .materialise(&template, group.as_ref(), date, key)
                    .await?;
                generated.push(expense);
            }

            let advanced = schedule.advanced_past(last_index);
            self.documents
                .update(
                    EXPENSES,
                    &doc_id(template.id.as_uuid()),
                    json!({
                        "recurrence": advanced,
                        "updated_at": self.clock.now(),
                    }),
                )
                .await?;
        }

        if !generated.is_empty() {
            info!(count = generated.len(), "recurring expenses materialised");
        }
        Ok(generated)
    }

    async fn materialise(
        &self,
        template: &Expense,
        group: Option<&Group>,
        date: NaiveDate,
        key: String,
    ) -> Result<Expense, LedgerError> {
        let fx = self
            .snapshot_rate(group, template.amount.currency(), None)
            .await?;
        let now = self.clock.now();
        let record = ExpenseRecord {
            recurrence: None,
            fx,
            date,
            occurrence_of: Some(key),
            operation_id: None,
            created_at: now,
            updated_at: now,
            ..ExpenseRecord::from(template)
        };
        let id = self.documents.create(EXPENSES, encode(&record)?).await?;
        let expense = record.into_expense(parse_id(&id)?);

        self.record_activity(NewActivity::for_expense(
            ActivityKind::RecurringGenerated,
            &expense.created_by,
            &expense,
        ))
        .await;
        Ok(expense)
    }

    // ------------------------------------------------------------------
    // Activity
    // ------------------------------------------------------------------

    /// Activity visible to `user`, newest first
    pub async fn list_activity(&self, user: &UserId) -> Result<Vec<Activity>, LedgerError> {
        let docs = self
            .documents
            .query(ACTIVITIES, Predicate::contains("participants", user))
            .await?;
        let mut entries = docs
            .into_iter()
            .map(|doc| {
                let (id, record): (String, ActivityRecord) = decode(doc)?;
                Ok(record.into_activity(parse_id(&id)?))
            })
            .collect::<Result<Vec<_>, PortError>>()?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn record_activity(&self, entry: NewActivity) {
        let kind = entry.kind.clone();
        if let Err(err) = self.try_record_activity(entry).await {
            warn!(kind = %kind, error = %err, "failed to append activity entry");
        }
    }

    async fn try_record_activity(&self, entry: NewActivity) -> Result<(), PortError> {
        if let Some(operation_id) = entry.operation_id {
            let existing = self
                .documents
                .query(
                    ACTIVITIES,
                    Predicate::eq("operation_id", operation_id)
                        .and(Predicate::eq("kind", entry.kind.as_str())),
                )
                .await?;
            if !existing.is_empty() {
                return Ok(());
            }
        }
        let record = ActivityRecord::new(entry, self.clock.now());
        self.documents.create(ACTIVITIES, encode(&record)?).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Loads the referenced group and checks everyone named belongs to it
    async fn group_context(
        &self,
        group_id: Option<GroupId>,
        users: &[UserId],
    ) -> Result<Option<Group>, LedgerError> {
        let Some(group_id) = group_id else {
            return Ok(None);
        };
        let group = self.get_group(group_id).await?;
        ensure_members(&group, users)?;
        Ok(Some(group))
    }

    /// Rate into the group's currency, frozen at write time
    async fn snapshot_rate(
        &self,
        group: Option<&Group>,
        currency: Currency,
        reuse: Option<FxSnapshot>,
    ) -> Result<Option<FxSnapshot>, LedgerError> {
        let Some(group) = group else {
            return Ok(None);
        };
        if group.currency == currency {
            return Ok(None);
        }
        if let Some(snapshot) = reuse.filter(|s| s.currency == group.currency) {
            return Ok(Some(snapshot));
        }

        let quote = self.rates.quote(currency, group.currency).await?;
        debug!(from = %currency, to = %group.currency, rate = %quote.rate, "captured conversion rate");
        Ok(Some(FxSnapshot {
            currency: group.currency,
            rate: quote.rate,
            fetched_at: quote.fetched_at,
        }))
    }

    async fn query_expenses(&self, predicate: Predicate) -> Result<Vec<Expense>, LedgerError> {
        let docs = self.documents.query(EXPENSES, predicate).await?;
        Ok(docs.into_iter().map(expense_from).collect::<Result<_, _>>()?)
    }

    async fn query_settlements(
        &self,
        predicate: Predicate,
    ) -> Result<Vec<Settlement>, LedgerError> {
        let docs = self.documents.query(SETTLEMENTS, predicate).await?;
        Ok(docs.into_iter().map(settlement_from).collect::<Result<_, _>>()?)
    }

    async fn find_expense_by_operation(
        &self,
        operation_id: OperationId,
    ) -> Result<Option<Expense>, LedgerError> {
        Ok(self
            .query_expenses(Predicate::eq("operation_id", operation_id))
            .await?
            .into_iter()
            .next())
    }

    async fn find_settlement_by_operation(
        &self,
        operation_id: OperationId,
    ) -> Result<Option<Settlement>, LedgerError> {
        Ok(self
            .query_settlements(Predicate::eq("operation_id", operation_id))
            .await?
            .into_iter()
            .next())
    }

    async fn find_occurrence(&self, key: &str) -> Result<Option<Expense>, LedgerError> {
        Ok(self
            .query_expenses(Predicate::eq("occurrence_of", key))
            .await?
            .into_iter()
            .next())
    }
}

fn expense_from(doc: Document) -> Result<Expense, PortError> {
    let (id, record): (String, ExpenseRecord) = decode(doc)?;
    Ok(record.into_expense(parse_id(&id)?))
}

fn settlement_from(doc: Document) -> Result<Settlement, PortError> {
    let (id, record): (String, SettlementRecord) = decode(doc)?;
    Ok(record.into_settlement(parse_id(&id)?))
}

fn group_from(doc: Document) -> Result<Group, PortError> {
    let (id, record): (String, GroupRecord) = decode(doc)?;
    Ok(record.into_group(parse_id(&id)?))
}
