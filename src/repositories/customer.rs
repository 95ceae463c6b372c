use chrono::{DateTime, Utc};
use metrics::counter;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use super::{Include, Relations, UpdateStatement};
use crate::auth::Claims;
use crate::config::FilterConfig;
use crate::database::models::CustomerRow;
use crate::database::Table;
use crate::domain::customer::{self, Customer, CustomerCreateRequest, CustomerUpdateRequest};
use crate::domain::{ensure_admin, ensure_audience, subject_id, truncate_millis, ArchiveRequest, DeleteRequest, RepositoryError};
use crate::filter::{Filter, FindRequest};

pub struct CustomerRepository {
    table: Table<CustomerRow>,
    relations: Relations,
    filter_config: FilterConfig,
    create_lock: Mutex<()>,
}

impl CustomerRepository {
    pub fn new(pool: PgPool, filter_config: FilterConfig) -> Self {
        Self {
            table: Table::new(customer::TABLE, customer::COLUMNS, pool.clone()),
            relations: Relations::new(pool),
            filter_config,
            create_lock: Mutex::new(()),
        }
    }

    fn build_filter(&self, req: &FindRequest, search: Option<&str>) -> Result<Filter<'static>, RepositoryError> {
        let mut filter = self.table.filter();
        filter.assign(req, &self.filter_config)?;
        if let Some(term) = search {
            filter.and_search(customer::SEARCH_COLUMNS, term)?;
        }
        Ok(filter)
    }

    #[instrument(name = "customer.find", skip(self, _claims, req))]
    pub async fn find(
        &self,
        _claims: &Claims,
        req: &FindRequest,
        search: Option<&str>,
        include: Include,
    ) -> Result<Vec<Customer>, RepositoryError> {
        let filter = self.build_filter(req, search)?;
        let rows = self.table.select_any(&filter).await?;
        let mut customers: Vec<Customer> = rows.into_iter().map(Customer::from).collect();
        self.attach(&mut customers, include).await?;
        Ok(customers)
    }

    #[instrument(name = "customer.count", skip(self, _claims, req))]
    pub async fn count(&self, _claims: &Claims, req: &FindRequest, search: Option<&str>) -> Result<i64, RepositoryError> {
        let filter = self.build_filter(req, search)?;
        self.table.count(&filter).await
    }

    #[instrument(name = "customer.read", skip(self, _claims))]
    pub async fn read_by_id(&self, _claims: &Claims, id: Uuid) -> Result<Customer, RepositoryError> {
        let mut customers = vec![Customer::from(self.table.select_404(id).await?)];
        self.attach(&mut customers, Include::default()).await?;
        customers.pop().ok_or_else(|| RepositoryError::NotFound(format!("customer {} not found", id)))
    }

    #[instrument(name = "customer.create", skip_all)]
    pub async fn create(&self, claims: &Claims, req: CustomerCreateRequest, now: DateTime<Utc>) -> Result<Customer, RepositoryError> {
        ensure_audience(claims)?;
        req.validate()?;
        let sales_rep_id = subject_id(claims)?;
        let now = truncate_millis(now);

        let sales_rep = self
            .relations
            .users([sales_rep_id])
            .await?
            .remove(&sales_rep_id)
            .ok_or_else(|| RepositoryError::BadRequest(format!("sales rep {} does not exist", sales_rep_id)))?;

        let _guard = self.create_lock.lock().await;
        let row: CustomerRow = sqlx::query_as(
            "INSERT INTO customers (id, name, email, phone_number, address, sales_rep_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(req.name.trim())
        .bind(req.email.as_deref().map(str::trim))
        .bind(req.phone_number.trim())
        .bind(req.address.as_deref())
        .bind(sales_rep_id)
        .bind(now)
        .fetch_one(self.table.pool())
        .await?;

        counter!("customers_created_total", 1);
        tracing::info!(customer_id = %row.id, "customer created");

        let mut customer = Customer::from(row);
        customer.sales_rep = Some(sales_rep);
        Ok(customer)
    }

    #[instrument(name = "customer.update", skip(self, claims, req), fields(id = %req.id))]
    pub async fn update(&self, claims: &Claims, req: CustomerUpdateRequest, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        let id = req.id;
        let changes = req.into_changes()?;
        if changes.is_empty() {
            return Ok(());
        }

        let mut statement = UpdateStatement::new(customer::TABLE, truncate_millis(now));
        if let Some(name) = changes.name {
            statement.set("name", name);
        }
        if let Some(email) = changes.email {
            statement.set("email", email);
        }
        if let Some(phone_number) = changes.phone_number {
            statement.set("phone_number", phone_number);
        }
        if let Some(address) = changes.address {
            statement.set("address", address);
        }
        if statement.execute(id, self.table.pool()).await? == 0 {
            return Err(RepositoryError::NotFound(format!("customer {} not found", id)));
        }
        counter!("customers_updated_total", 1);
        Ok(())
    }

    #[instrument(name = "customer.archive", skip(self, claims), fields(id = %req.id))]
    pub async fn archive(&self, claims: &Claims, req: ArchiveRequest, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        self.table.archive(req.id, truncate_millis(now)).await?;
        counter!("customers_archived_total", 1);
        Ok(())
    }

    #[instrument(name = "customer.delete", skip(self, claims), fields(id = %req.id))]
    pub async fn delete(&self, claims: &Claims, req: DeleteRequest) -> Result<(), RepositoryError> {
        ensure_admin(claims)?;
        self.table.delete(req.id).await?;
        counter!("customers_deleted_total", 1);
        Ok(())
    }

    async fn attach(&self, customers: &mut [Customer], include: Include) -> Result<(), RepositoryError> {
        if include.account {
            let mut accounts = self.relations.accounts_by_customer(customers.iter().map(|c| c.id)).await?;
            for c in customers.iter_mut() {
                c.accounts = accounts.remove(&c.id).unwrap_or_default();
            }
        }
        if include.sales_rep {
            let users = self.relations.users(customers.iter().map(|c| c.sales_rep_id)).await?;
            for c in customers.iter_mut() {
                c.sales_rep = users.get(&c.sales_rep_id).cloned();
            }
        }
        Ok(())
    }
}
