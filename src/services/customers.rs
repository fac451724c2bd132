use crate::db::DbPool;
use crate::entities::{
    customer, customer_address, Customer, CustomerAddress, CustomerAddressModel, CustomerModel,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Customer accounts and their saved shipping addresses.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Register a new customer. The loyalty balance starts at zero unless
    /// the caller seeds one.
    #[instrument(skip(self, input))]
    pub async fn create_customer(
        &self,
        input: CreateCustomerInput,
    ) -> Result<CustomerModel, ServiceError> {
        let existing = Customer::find()
            .filter(customer::Column::Email.eq(&input.email))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Email '{}' is already registered",
                input.email
            )));
        }

        let customer_id = Uuid::new_v4();
        let now = Utc::now();
        let customer = customer::ActiveModel {
            id: Set(customer_id),
            name: Set(input.name),
            email: Set(input.email),
            loyalty_points: Set(input.loyalty_points.unwrap_or(0)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let customer = customer.insert(self.db.as_ref()).await?;

        self.event_sender
            .send_or_log(Event::CustomerCreated(customer_id))
            .await;

        info!(customer_id = %customer_id, "Customer registered");
        Ok(customer)
    }

    #[instrument(skip(self))]
    pub async fn get_customer(&self, customer_id: Uuid) -> Result<CustomerModel, ServiceError> {
        Customer::find_by_id(customer_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", customer_id)))
    }

    /// Save a shipping address for later checkout reference.
    #[instrument(skip(self, input))]
    pub async fn add_address(
        &self,
        customer_id: Uuid,
        input: AddAddressInput,
    ) -> Result<CustomerAddressModel, ServiceError> {
        self.get_customer(customer_id).await?;

        let address_id = Uuid::new_v4();
        let address = customer_address::ActiveModel {
            id: Set(address_id),
            customer_id: Set(customer_id),
            recipient_name: Set(input.recipient_name),
            phone: Set(input.phone),
            line1: Set(input.line1),
            line2: Set(input.line2),
            city: Set(input.city),
            state: Set(input.state),
            postal_code: Set(input.postal_code),
            country: Set(input.country),
            created_at: Set(Utc::now()),
        };

        let address = address.insert(self.db.as_ref()).await?;

        info!(customer_id = %customer_id, address_id = %address_id, "Address saved");
        Ok(address)
    }

    #[instrument(skip(self))]
    pub async fn get_addresses(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<CustomerAddressModel>, ServiceError> {
        self.get_customer(customer_id).await?;

        CustomerAddress::find()
            .filter(customer_address::Column::CustomerId.eq(customer_id))
            .order_by_desc(customer_address::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(Into::into)
    }
}

/// Input for registering a customer
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    /// Optional starting balance; omitted means zero.
    #[validate(range(min = 0))]
    pub loyalty_points: Option<i32>,
}

/// Input for saving an address
#[derive(Debug, Deserialize, Validate)]
pub struct AddAddressInput {
    #[validate(length(min = 1, max = 200))]
    pub recipient_name: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 100))]
    pub country: String,
}
