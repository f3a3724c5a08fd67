//! Sales orders domain module.
//!
//! Order validation, the status lifecycle, and the stock movements a status
//! change implies. Pure domain logic (no IO, no HTTP, no storage).

pub mod order;

pub use order::{
    ChangeSalesOrderStatus, NewOrderLine, NewSalesOrder, OrderLine, SalesOrder,
    SalesOrderStatus, SalesOrderStatusChanged, StockEffect,
};
